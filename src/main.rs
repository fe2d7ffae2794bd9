//! CLI entry point for the scrape coverage auditor.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use scrape_audit::AuditOptions;

/// Read-only scrape coverage auditor: fetches venue calendar sources,
/// compares them against the cached event set, and writes JSON + Markdown
/// reports.
#[derive(Debug, Parser)]
#[command(name = "scrape-audit", version)]
struct Args {
    /// Venue registry JSON file.
    #[arg(long, default_value = "data/venue-registry.json")]
    registry: PathBuf,

    /// Venue-events cache JSON file.
    #[arg(long, default_value = "data/venue-events-cache.json")]
    cache: PathBuf,

    /// Where to write the JSON report.
    #[arg(long, default_value = "data/scrape-audit-report.json")]
    output_json: PathBuf,

    /// Where to write the Markdown summary.
    #[arg(long, default_value = "data/scrape-audit-summary.md")]
    output_md: PathBuf,

    /// 1-indexed first venue to audit.
    #[arg(long, default_value_t = 1)]
    start: usize,

    /// 1-indexed inclusive last venue to audit.
    #[arg(long)]
    end: Option<usize>,

    /// Cap on the number of venues audited after range selection.
    #[arg(long)]
    max_venues: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 20.0)]
    timeout: f64,

    /// Pause between requests in seconds.
    #[arg(long, default_value_t = 0.15)]
    delay: f64,

    /// Disable TLS certificate verification (for venues with broken certs).
    #[arg(long)]
    insecure: bool,

    /// Suppress progress output.
    #[arg(long)]
    quiet: bool,
}

impl From<Args> for AuditOptions {
    fn from(args: Args) -> Self {
        Self {
            registry: args.registry,
            cache: args.cache,
            output_json: args.output_json,
            output_md: args.output_md,
            start: args.start,
            end: args.end,
            max_venues: args.max_venues,
            timeout_seconds: args.timeout,
            delay_seconds: args.delay,
            insecure: args.insecure,
            quiet: args.quiet,
        }
    }
}

fn main() -> ExitCode {
    let options = AuditOptions::from(Args::parse());
    match scrape_audit::run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
