//! Corpus-wide aggregation and report rendering.

use serde::Serialize;

use crate::audit::round4;
use crate::types::{AuditRow, Confidence};

const TABLE_ROW_LIMIT: usize = 25;
const DETAIL_ROW_LIMIT: usize = 25;
const DETAIL_EXAMPLE_LIMIT: usize = 10;

/// The whole-run JSON report.
#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub generated_at_utc: String,
    pub inputs: ReportInputs,
    pub dedupe: DedupeStats,
    pub summary: Summary,
    pub rows: Vec<AuditRow>,
}

/// CLI parameters echoed into the report.
#[derive(Debug, Serialize)]
pub struct ReportInputs {
    pub registry: String,
    pub cache: String,
    pub start: usize,
    pub end: usize,
    pub max_venues: Option<usize>,
    pub timeout: f64,
    pub delay: f64,
    pub insecure: bool,
}

#[derive(Debug, Serialize)]
pub struct DedupeStats {
    pub dropped_duplicate_registry_rows: usize,
}

/// Aggregate statistics across all audited rows.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_venues_checked: usize,
    pub venues_with_gaps_count: usize,
    pub rows_with_source_count: usize,
    pub rows_without_source_count: usize,
    pub total_missing_events: usize,
    pub average_coverage_with_source: Option<f64>,
    pub coverage_distribution_with_source: CoverageDistribution,
    pub fetch_error_count: usize,
    pub stale_metadata_count: usize,
    pub high_confidence_gap_count: usize,
}

/// Six-bucket coverage histogram over rows with source events. The bucket
/// boundaries (`==0`, `<=0.25`, `<=0.5`, `<=0.75`, `<1`, `==1`) and key names
/// are fixed for report comparability across runs.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoverageDistribution {
    pub zero: usize,
    pub one_to_25: usize,
    pub twenty6_to_50: usize,
    pub fifty1_to_75: usize,
    pub seventy6_to_99: usize,
    pub hundred: usize,
}

/// Order rows so the worst-covered, highest-volume venues surface first:
/// missing count descending, coverage ascending (no coverage sorts best),
/// source count descending, then domain.
pub fn sort_rows(rows: &mut [AuditRow]) {
    rows.sort_by(|a, b| {
        b.missing_count
            .cmp(&a.missing_count)
            .then_with(|| {
                a.coverage_ratio
                    .unwrap_or(1.0)
                    .total_cmp(&b.coverage_ratio.unwrap_or(1.0))
            })
            .then_with(|| b.source_event_count.cmp(&a.source_event_count))
            .then_with(|| a.domain.cmp(&b.domain))
    });
}

/// Aggregate per-venue rows into the corpus summary.
pub fn summarize(rows: &[AuditRow]) -> Summary {
    let with_source: Vec<&AuditRow> = rows
        .iter()
        .filter(|row| row.source_event_count > 0)
        .collect();

    let total_missing_events = with_source.iter().map(|row| row.missing_count).sum();

    let average_coverage_with_source = (!with_source.is_empty()).then(|| {
        let total: f64 = with_source
            .iter()
            .map(|row| row.coverage_ratio.unwrap_or(0.0))
            .sum();
        round4(total / with_source.len() as f64)
    });

    let mut distribution = CoverageDistribution::default();
    for row in &with_source {
        let coverage = row.coverage_ratio.unwrap_or(0.0);
        if coverage == 0.0 {
            distribution.zero += 1;
        } else if coverage <= 0.25 {
            distribution.one_to_25 += 1;
        } else if coverage <= 0.5 {
            distribution.twenty6_to_50 += 1;
        } else if coverage <= 0.75 {
            distribution.fifty1_to_75 += 1;
        } else if coverage < 1.0 {
            distribution.seventy6_to_99 += 1;
        } else {
            distribution.hundred += 1;
        }
    }

    Summary {
        total_venues_checked: rows.len(),
        venues_with_gaps_count: rows.iter().filter(|row| row.missing_count > 0).count(),
        rows_with_source_count: with_source.len(),
        rows_without_source_count: rows.len() - with_source.len(),
        total_missing_events,
        average_coverage_with_source,
        coverage_distribution_with_source: distribution,
        fetch_error_count: rows
            .iter()
            .filter(|row| row.fetch_errors.jina_error || row.fetch_errors.raw_error)
            .count(),
        stale_metadata_count: rows
            .iter()
            .filter(|row| row.quality_flags.stale_metadata)
            .count(),
        high_confidence_gap_count: rows
            .iter()
            .filter(|row| row.confidence == Confidence::High && row.missing_count > 0)
            .count(),
    }
}

fn coverage_cell(ratio: Option<f64>) -> String {
    match ratio {
        Some(coverage) => format!("{:.1}%", coverage * 100.0),
        None => "n/a".to_string(),
    }
}

/// Render the human-readable Markdown summary.
pub fn render_markdown(report: &AuditReport) -> String {
    let summary = &report.summary;
    let mut lines: Vec<String> = Vec::new();

    lines.push("# Scrape Coverage Audit".to_string());
    lines.push(String::new());
    lines.push(format!("Generated: {}", report.generated_at_utc));
    lines.push(format!(
        "Total venues checked: {}",
        summary.total_venues_checked
    ));
    lines.push(format!(
        "Venues with gaps: {}",
        summary.venues_with_gaps_count
    ));
    lines.push(format!(
        "Rows with source events: {}",
        summary.rows_with_source_count
    ));
    lines.push(format!(
        "Rows without source events: {}",
        summary.rows_without_source_count
    ));
    lines.push(format!(
        "Total missing events (rows with source): {}",
        summary.total_missing_events
    ));
    let average = match summary.average_coverage_with_source {
        Some(avg) => avg.to_string(),
        None => "n/a".to_string(),
    };
    lines.push(format!("Average coverage (rows with source): {average}"));
    lines.push(String::new());

    lines.push("## Coverage Distribution (Rows with Source)".to_string());
    let dist = &summary.coverage_distribution_with_source;
    lines.push(format!("- 0%: {}", dist.zero));
    lines.push(format!("- 1-25%: {}", dist.one_to_25));
    lines.push(format!("- 26-50%: {}", dist.twenty6_to_50));
    lines.push(format!("- 51-75%: {}", dist.fifty1_to_75));
    lines.push(format!("- 76-99%: {}", dist.seventy6_to_99));
    lines.push(format!("- 100%: {}", dist.hundred));
    lines.push(String::new());

    lines.push("## Top 25 Gaps".to_string());
    lines.push(String::new());
    lines.push(
        "| Rank | Domain | Source | Cache | Missing | Coverage | Confidence | Fetch Error |"
            .to_string(),
    );
    lines.push("| --- | --- | ---: | ---: | ---: | ---: | --- | --- |".to_string());

    let gaps: Vec<&AuditRow> = report
        .rows
        .iter()
        .filter(|row| row.missing_count > 0)
        .collect();
    for (rank, row) in gaps.iter().take(TABLE_ROW_LIMIT).enumerate() {
        let fetch_error = row.fetch_errors.jina_error || row.fetch_errors.raw_error;
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            rank + 1,
            row.domain,
            row.source_event_count,
            row.cache_event_count,
            row.missing_count,
            coverage_cell(row.coverage_ratio),
            row.confidence,
            if fetch_error { "yes" } else { "no" },
        ));
    }

    lines.push(String::new());
    lines.push("## High-Confidence Gap Details".to_string());
    lines.push(String::new());

    let high_confidence = gaps
        .iter()
        .filter(|row| row.confidence == Confidence::High)
        .take(DETAIL_ROW_LIMIT);
    for row in high_confidence {
        lines.push(format!("### {}", row.domain));
        lines.push(format!("- Venue: {}", row.venue_name_registry));
        lines.push(format!("- Calendar URL: {}", row.calendar_url));
        lines.push(format!("- Missing: {}", row.missing_count));
        lines.push(format!("- Coverage: {}", coverage_cell(row.coverage_ratio)));
        lines.push(format!("- Source type: {}", row.source_type));
        lines.push("- Missing examples:".to_string());
        for example in row.missing_examples.iter().take(DETAIL_EXAMPLE_LIMIT) {
            lines.push(format!("  - `{example}`"));
        }
        lines.push(String::new());
    }

    lines.push("## Notes".to_string());
    lines.push("- Report is read-only and may include fetch/noise limits on JS-heavy sites.".to_string());
    lines.push("- Confidence is heuristic: high/medium/low/unknown.".to_string());
    lines.push(String::new());

    lines.join("\n")
}
