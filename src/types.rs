//! Core types for the scrape coverage audit.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One venue row from the registry file.
///
/// Every field defaults to empty so partially filled registry entries parse
/// cleanly; eligibility is decided later by `calendar_url` starting with
/// `http`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueRecord {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub calendar_url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub city: String,
}

/// The venue-events cache file: `{ "venues": { "<domain>": {...} } }`.
///
/// Keyed in a `BTreeMap` so host-normalized lookups scan deterministically.
/// Entries may be JSON `null`, which counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsCache {
    #[serde(default)]
    pub venues: std::collections::BTreeMap<String, Option<CacheVenueEntry>>,
}

/// A single venue's cached entry. The cache is loosely shaped, so every
/// field tolerates a wrong-typed value by defaulting instead of erroring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheVenueEntry {
    #[serde(default, rename = "venueName", deserialize_with = "lenient_text")]
    pub venue_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub city: String,
    #[serde(default, deserialize_with = "lenient_events")]
    pub events: Vec<CachedEvent>,
}

/// A loosely structured cached event. Fields may be missing or carry
/// non-string values; non-strings deserialize to `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CachedEvent {
    #[serde(default, rename = "eventUrl", deserialize_with = "lenient_string")]
    pub event_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, rename = "startDate", deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        _ => String::new(),
    })
}

fn lenient_events<'de, D>(deserializer: D) -> Result<Vec<CachedEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// An event reduced to its comparable identity.
///
/// Constructed fresh per audit run from either the live source or the cache
/// snapshot; only the derived `AuditRow` is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub key: String,
    pub event_url: Option<String>,
    pub title: Option<String>,
    pub start_date: Option<String>,
}

/// Detected kind of a fetched calendar source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceType {
    #[serde(rename = "ICS")]
    Ics,
    #[serde(rename = "HTML")]
    Html,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Ics => f.write_str("ICS"),
            SourceType::Html => f.write_str("HTML"),
        }
    }
}

/// How much an operator should trust a reported gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Unknown,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Confidence::None => "none",
            Confidence::Unknown => "unknown",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}

/// Heuristic data-quality flags derived from a venue's cached events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityFlags {
    pub invalid_dates_count: usize,
    pub duplicate_url_count: usize,
    pub missing_url_count: usize,
    pub generic_title_count: usize,
    pub stale_metadata: bool,
}

/// Outcome of the two retrieval paths for one venue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchErrors {
    pub jina_error: bool,
    pub raw_error: bool,
    pub jina_error_detail: Option<String>,
    pub raw_error_detail: Option<String>,
}

/// One audited venue, as it appears in the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRow {
    pub domain: String,
    pub venue_name_registry: String,
    pub calendar_url: String,
    pub source_type: SourceType,
    pub source_event_count: usize,
    pub cache_event_count: usize,
    pub coverage_ratio: Option<f64>,
    pub missing_count: usize,
    pub extra_count: usize,
    pub intersection_count: usize,
    pub missing_examples: Vec<String>,
    pub extra_examples: Vec<String>,
    pub quality_flags: QualityFlags,
    pub fetch_errors: FetchErrors,
    pub confidence: Confidence,
}

/// Run options, filled in by the CLI.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub registry: PathBuf,
    pub cache: PathBuf,
    pub output_json: PathBuf,
    pub output_md: PathBuf,
    /// 1-indexed first venue to audit.
    pub start: usize,
    /// 1-indexed inclusive last venue; `None` means through the end.
    pub end: Option<usize>,
    pub max_venues: Option<usize>,
    pub timeout_seconds: f64,
    pub delay_seconds: f64,
    pub insecure: bool,
    pub quiet: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("data/venue-registry.json"),
            cache: PathBuf::from("data/venue-events-cache.json"),
            output_json: PathBuf::from("data/scrape-audit-report.json"),
            output_md: PathBuf::from("data/scrape-audit-summary.md"),
            start: 1,
            end: None,
            max_venues: None,
            timeout_seconds: 20.0,
            delay_seconds: 0.15,
            insecure: false,
            quiet: false,
        }
    }
}
