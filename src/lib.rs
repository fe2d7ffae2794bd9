//! Read-only scrape coverage auditor for venue calendar sources.
//!
//! Fetches each venue's calendar page through two retrieval paths, parses
//! ICS feeds and HTML/Markdown link listings into normalized event keys,
//! diffs them against the cached event set, and writes a JSON report plus a
//! Markdown summary. Never writes to the registry or cache.

mod audit;
mod cache;
mod fetch;
mod heuristics;
mod html;
mod ics;
mod normalize;
mod report;
mod types;

pub use audit::{audit_venue, classify_confidence, dedupe_venues, detect_source_type};
pub use fetch::{FetchResult, Fetcher, READER_PROXY_BASE};
pub use heuristics::PathHeuristics;
pub use normalize::{canonicalize_url, is_same_site, make_event_key, normalize_host};
pub use report::{
    render_markdown, summarize, AuditReport, CoverageDistribution, DedupeStats, ReportInputs,
    Summary,
};
pub use types::{
    AuditOptions, AuditRow, CacheVenueEntry, CachedEvent, CanonicalEvent, Confidence, EventsCache,
    FetchErrors, QualityFlags, SourceType, VenueRecord,
};

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;

/// Run the full audit with the given options.
///
/// Input problems (missing files, bad JSON, inverted range) are errors;
/// per-venue fetch failures degrade that venue's row and the run continues.
pub fn run(options: &AuditOptions) -> Result<()> {
    if !options.registry.exists() {
        bail!("Registry file not found: {}", options.registry.display());
    }
    if !options.cache.exists() {
        bail!("Cache file not found: {}", options.cache.display());
    }

    let registry: Vec<VenueRecord> = load_json(&options.registry)?;
    let cache_file: EventsCache = load_json(&options.cache)?;

    let eligible: Vec<VenueRecord> = registry
        .into_iter()
        .filter(|venue| venue.calendar_url.starts_with("http"))
        .collect();
    let (venues, dropped_duplicates) = dedupe_venues(eligible);

    let start = options.start.max(1);
    let end = options.end.unwrap_or(venues.len()).min(venues.len());
    if start > end {
        bail!("Invalid range: start > end");
    }

    let mut selected = venues[start - 1..end].to_vec();
    if let Some(max_venues) = options.max_venues {
        selected.truncate(max_venues);
    }

    let fetcher = Fetcher::new(
        options.timeout_seconds,
        options.delay_seconds,
        options.insecure,
    )?;
    let heuristics = PathHeuristics::standard();

    let total = selected.len();
    let mut rows = Vec::with_capacity(total);
    for (index, venue) in selected.iter().enumerate() {
        if !options.quiet {
            println!("[{}/{}] Auditing {} ...", index + 1, total, venue.domain);
        }
        let fetched = fetcher.fetch_source(venue.calendar_url.trim());
        rows.push(audit_venue(venue, &cache_file, &fetched, &heuristics));
    }

    report::sort_rows(&mut rows);
    let summary = summarize(&rows);
    let audit_report = AuditReport {
        generated_at_utc: Utc::now().to_rfc3339(),
        inputs: ReportInputs {
            registry: options.registry.display().to_string(),
            cache: options.cache.display().to_string(),
            start,
            end,
            max_venues: options.max_venues,
            timeout: options.timeout_seconds,
            delay: options.delay_seconds,
            insecure: options.insecure,
        },
        dedupe: DedupeStats {
            dropped_duplicate_registry_rows: dropped_duplicates,
        },
        summary,
        rows,
    };

    write_json(&options.output_json, &audit_report)?;
    write_text(&options.output_md, &render_markdown(&audit_report))?;

    if !options.quiet {
        println!("Wrote JSON: {}", options.output_json.display());
        println!("Wrote Markdown: {}", options.output_md.display());
        println!("{}", serde_json::to_string_pretty(&audit_report.summary)?);
    }

    Ok(())
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, payload: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut text = serde_json::to_string_pretty(payload)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
