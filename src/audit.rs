//! Per-venue audit checks: source-type detection, coverage diffing, quality
//! flags, and confidence classification.

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cache;
use crate::fetch::FetchResult;
use crate::heuristics::PathHeuristics;
use crate::html;
use crate::ics;
use crate::normalize::{key_to_display, normalize_host};
use crate::types::{
    AuditRow, CacheVenueEntry, CachedEvent, CanonicalEvent, Confidence, EventsCache, FetchErrors,
    QualityFlags, SourceType, VenueRecord,
};

/// Missing/extra example lists on a row are bounded to this many keys.
const EXAMPLE_KEY_LIMIT: usize = 20;

static GENERIC_TITLE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["^event$", "^tbd$", "^tba$", "^coming soon$", "^untitled$"]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

static LOOSE_ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}(?::\d{2})?)?").unwrap());
static LOOSE_COMPACT_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}(?:T\d{4,6}Z?)?$").unwrap());

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Classify a fetched source as ICS or HTML: by URL shape first, then by
/// whether either body opens with `BEGIN:VCALENDAR`.
pub fn detect_source_type(calendar_url: &str, jina_text: &str, raw_text: &str) -> SourceType {
    let normalized_url = calendar_url.to_lowercase();
    if normalized_url.contains(".ics") || normalized_url.contains("ical=1") {
        return SourceType::Ics;
    }
    for body in [jina_text, raw_text] {
        let snippet = body.trim_start();
        if snippet
            .get(..15)
            .is_some_and(|head| head.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
        {
            return SourceType::Ics;
        }
    }
    SourceType::Html
}

/// Drop registry rows repeating an earlier `(normalized host, calendar URL)`
/// pair; trailing slashes on the calendar URL do not make rows distinct.
pub fn dedupe_venues(venues: Vec<VenueRecord>) -> (Vec<VenueRecord>, usize) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut unique = Vec::with_capacity(venues.len());
    let mut duplicates = 0;

    for venue in venues {
        let key = (
            normalize_host(&venue.domain),
            venue.calendar_url.trim().trim_end_matches('/').to_string(),
        );
        if seen.insert(key) {
            unique.push(venue);
        } else {
            duplicates += 1;
        }
    }

    (unique, duplicates)
}

fn count_duplicate_urls(events: &[CanonicalEvent]) -> usize {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates = 0;
    for event in events {
        let Some(url) = event.event_url.as_deref() else {
            continue;
        };
        if !seen.insert(url) {
            duplicates += 1;
        }
    }
    duplicates
}

/// Missing, too-short, or placeholder titles ("event", "tbd", "tba",
/// "coming soon", "untitled").
pub fn looks_generic_title(title: Option<&str>) -> bool {
    let Some(title) = title else {
        return true;
    };
    let text = title.trim();
    if text.chars().count() < 5 {
        return true;
    }
    let lowered = text.to_lowercase();
    GENERIC_TITLE_RES
        .iter()
        .any(|pattern| pattern.is_match(&lowered))
}

/// A present start date that matches neither the loose ISO nor the compact
/// form. An absent date is not invalid, just absent.
pub fn is_invalid_date(start_date: Option<&str>) -> bool {
    let Some(raw) = start_date else {
        return false;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return true;
    }
    !(LOOSE_ISO_DATE_RE.is_match(raw) || LOOSE_COMPACT_DATE_RE.is_match(raw))
}

/// Derive the per-venue quality flags from the cached events.
pub fn quality_flags(
    cache_events_parsed: &[CanonicalEvent],
    cache_raw_events: &[CachedEvent],
    registry_venue: &VenueRecord,
    cache_venue: Option<&CacheVenueEntry>,
) -> QualityFlags {
    let missing_url_count = cache_events_parsed
        .iter()
        .filter(|event| event.event_url.is_none())
        .count();
    let duplicate_url_count = count_duplicate_urls(cache_events_parsed);
    let invalid_dates_count = cache_raw_events
        .iter()
        .filter(|event| is_invalid_date(event.start_date.as_deref()))
        .count();
    let generic_title_count = cache_raw_events
        .iter()
        .filter(|event| looks_generic_title(event.title.as_deref()))
        .count();

    let stale_metadata = cache_venue.is_some_and(|entry| {
        entry.venue_name.trim() != registry_venue.name.trim()
            || entry.category.trim() != registry_venue.category.trim()
            || entry.city.trim() != registry_venue.city.trim()
    });

    QualityFlags {
        invalid_dates_count,
        duplicate_url_count,
        missing_url_count,
        generic_title_count,
        stale_metadata,
    }
}

/// Ordered confidence rules for a venue's reported gap.
///
/// No source events means no ground truth, so that rule is decisive: a venue
/// whose source could not be fetched or parsed must read `unknown`, not
/// `none`. After that: no gap, then fetch trouble, then URL-less cache keys,
/// else a trustworthy gap.
pub fn classify_confidence(
    source_event_count: usize,
    missing_count: usize,
    fetch_error: bool,
    cache_event_count: usize,
    missing_url_count: usize,
) -> Confidence {
    if source_event_count == 0 {
        return Confidence::Unknown;
    }
    if missing_count == 0 {
        return Confidence::None;
    }
    if fetch_error {
        return Confidence::Low;
    }
    if cache_event_count > 0 && missing_url_count == cache_event_count {
        return Confidence::Medium;
    }
    Confidence::High
}

/// Audit one venue against the cache, given the already-fetched bodies.
///
/// Total below the fetch boundary: parser-level problems surface as fewer
/// events, fetch-level problems as `fetch_errors` on the row. Neither aborts
/// the batch.
pub fn audit_venue(
    venue: &VenueRecord,
    cache_file: &EventsCache,
    fetched: &FetchResult,
    heuristics: &PathHeuristics,
) -> AuditRow {
    let domain = venue.domain.trim();
    let calendar_url = venue.calendar_url.trim();

    let jina_text = fetched.jina_body();
    let raw_text = fetched.raw_body();

    let source_type = detect_source_type(calendar_url, jina_text, raw_text);
    let source_events = match source_type {
        SourceType::Ics => {
            // Prefer the reader-proxy body when it has content.
            let body = if jina_text.is_empty() { raw_text } else { jina_text };
            ics::parse_events(body, calendar_url, domain)
        }
        SourceType::Html => {
            html::parse_events(calendar_url, domain, raw_text, jina_text, heuristics)
        }
    };
    let source_keys: BTreeSet<&str> = source_events.iter().map(|e| e.key.as_str()).collect();

    let cache_venue = cache::lookup_venue(cache_file, domain);
    let cache_raw_events: &[CachedEvent] =
        cache_venue.map_or(&[], |entry| entry.events.as_slice());
    let cache_events = cache::parse_events(cache_raw_events, calendar_url);
    let cache_keys: BTreeSet<&str> = cache_events.iter().map(|e| e.key.as_str()).collect();

    let missing: Vec<&str> = source_keys.difference(&cache_keys).copied().collect();
    let extra: Vec<&str> = cache_keys.difference(&source_keys).copied().collect();
    let intersection_count = source_keys.intersection(&cache_keys).count();

    let source_count = source_keys.len();
    let cache_count = cache_keys.len();
    let coverage_ratio =
        (source_count > 0).then(|| round4(intersection_count as f64 / source_count as f64));

    let flags = quality_flags(&cache_events, cache_raw_events, venue, cache_venue);
    let confidence = classify_confidence(
        source_count,
        missing.len(),
        fetched.any_error(),
        cache_count,
        flags.missing_url_count,
    );

    AuditRow {
        domain: domain.to_string(),
        venue_name_registry: venue.name.clone(),
        calendar_url: calendar_url.to_string(),
        source_type,
        source_event_count: source_count,
        cache_event_count: cache_count,
        coverage_ratio,
        missing_count: missing.len(),
        extra_count: extra.len(),
        intersection_count,
        missing_examples: missing
            .iter()
            .take(EXAMPLE_KEY_LIMIT)
            .map(|key| key_to_display(key).to_string())
            .collect(),
        extra_examples: extra
            .iter()
            .take(EXAMPLE_KEY_LIMIT)
            .map(|key| key_to_display(key).to_string())
            .collect(),
        quality_flags: flags,
        fetch_errors: FetchErrors {
            jina_error: fetched.jina_error.is_some(),
            raw_error: fetched.raw_error.is_some(),
            jina_error_detail: fetched.jina_error.clone(),
            raw_error_detail: fetched.raw_error.clone(),
        },
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue(domain: &str, calendar_url: &str) -> VenueRecord {
        VenueRecord {
            domain: domain.to_string(),
            calendar_url: calendar_url.to_string(),
            name: "The Venue".to_string(),
            category: "music".to_string(),
            city: "Oakland".to_string(),
        }
    }

    fn cache_from(json: &str) -> EventsCache {
        serde_json::from_str(json).unwrap()
    }

    fn raw_fetch(body: &str) -> FetchResult {
        FetchResult {
            raw_text: Some(body.to_string()),
            ..FetchResult::default()
        }
    }

    fn rules() -> PathHeuristics {
        PathHeuristics::standard()
    }

    // --- detect_source_type ---

    #[test]
    fn detect_by_url_shape() {
        assert_eq!(
            detect_source_type("https://venue.org/events.ics", "", ""),
            SourceType::Ics
        );
        assert_eq!(
            detect_source_type("https://venue.org/events?ical=1", "", ""),
            SourceType::Ics
        );
        assert_eq!(
            detect_source_type("https://venue.org/events", "", ""),
            SourceType::Html
        );
    }

    #[test]
    fn detect_by_body_prefix() {
        assert_eq!(
            detect_source_type("https://venue.org/feed", "", "  begin:vcalendar\n..."),
            SourceType::Ics
        );
        assert_eq!(
            detect_source_type("https://venue.org/feed", "BEGIN:VCALENDAR", ""),
            SourceType::Ics
        );
        assert_eq!(
            detect_source_type("https://venue.org/feed", "<html>", "<html>"),
            SourceType::Html
        );
    }

    // --- dedupe_venues ---

    #[test]
    fn dedupe_drops_trailing_slash_and_www_duplicates() {
        let venues = vec![
            venue("venue.org", "https://venue.org/events"),
            venue("www.venue.org", "https://venue.org/events/"),
            venue("venue.org", "https://venue.org/other"),
        ];
        let (unique, dropped) = dedupe_venues(venues);
        assert_eq!(unique.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(unique[0].domain, "venue.org");
    }

    // --- looks_generic_title / is_invalid_date ---

    #[test]
    fn generic_titles_are_flagged() {
        assert!(looks_generic_title(None));
        assert!(looks_generic_title(Some("TBD")));
        assert!(looks_generic_title(Some("Coming Soon")));
        assert!(looks_generic_title(Some("Gala"))); // under 5 characters
        assert!(!looks_generic_title(Some("Jazz Night")));
    }

    #[test]
    fn invalid_dates_are_flagged() {
        assert!(!is_invalid_date(None));
        assert!(!is_invalid_date(Some("2025-09-01")));
        assert!(!is_invalid_date(Some("2025-09-01T19:00")));
        assert!(!is_invalid_date(Some("20250901T190000Z")));
        assert!(is_invalid_date(Some("")));
        assert!(is_invalid_date(Some("next friday")));
        assert!(is_invalid_date(Some("09/01/2025")));
    }

    // --- classify_confidence ---

    #[test]
    fn confidence_rules_fire_in_order() {
        // No ground truth beats everything, including "no gap".
        assert_eq!(classify_confidence(0, 0, true, 5, 0), Confidence::Unknown);
        assert_eq!(classify_confidence(0, 0, false, 0, 0), Confidence::Unknown);
        // No gap.
        assert_eq!(classify_confidence(4, 0, true, 4, 0), Confidence::None);
        // Gap but the fetch was shaky.
        assert_eq!(classify_confidence(4, 2, true, 4, 0), Confidence::Low);
        // Gap, clean fetch, but every cached event lacks a URL.
        assert_eq!(classify_confidence(4, 2, false, 3, 3), Confidence::Medium);
        // Trustworthy gap.
        assert_eq!(classify_confidence(4, 2, false, 3, 1), Confidence::High);
        assert_eq!(classify_confidence(4, 2, false, 0, 0), Confidence::High);
    }

    // --- quality_flags ---

    #[test]
    fn quality_flags_count_weak_cache_entries() {
        let cache = cache_from(
            r#"{"venues": {"venue.org": {
                "venueName": "The Venue", "category": "music", "city": "Oakland",
                "events": [
                    {"eventUrl": "https://venue.org/events/a", "title": "Jazz Night", "startDate": "2025-09-01"},
                    {"eventUrl": "https://venue.org/events/a", "title": "TBD", "startDate": "whenever"},
                    {"title": "Open Mic Night", "startDate": "2025-09-02"}
                ]}}}"#,
        );
        let registry_venue = venue("venue.org", "https://venue.org/events");
        let entry = cache::lookup_venue(&cache, "venue.org");
        let raw_events = entry.map_or(&[][..], |e| e.events.as_slice());
        let parsed = cache::parse_events(raw_events, "https://venue.org/events");

        let flags = quality_flags(&parsed, raw_events, &registry_venue, entry);
        assert_eq!(flags.missing_url_count, 1);
        assert_eq!(flags.duplicate_url_count, 1);
        assert_eq!(flags.invalid_dates_count, 1);
        assert_eq!(flags.generic_title_count, 1);
        assert!(!flags.stale_metadata);
    }

    #[test]
    fn stale_metadata_compares_against_registry() {
        let cache = cache_from(
            r#"{"venues": {"venue.org": {
                "venueName": "Old Name", "category": "music", "city": "Oakland",
                "events": []}}}"#,
        );
        let registry_venue = venue("venue.org", "https://venue.org/events");
        let entry = cache::lookup_venue(&cache, "venue.org");
        let flags = quality_flags(&[], &[], &registry_venue, entry);
        assert!(flags.stale_metadata);

        // No cache entry at all: nothing to be stale.
        let flags = quality_flags(&[], &[], &registry_venue, None);
        assert!(!flags.stale_metadata);
    }

    // --- audit_venue scenarios ---

    #[test]
    fn audit_reports_full_gap_for_uncached_ics_feed() {
        let ics = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nSUMMARY:Jazz Night\nDTSTART:20250901\nEND:VEVENT\nBEGIN:VEVENT\nSUMMARY:Cancelled Gala\nSTATUS:CANCELLED\nDTSTART:20250902\nEND:VEVENT\nEND:VCALENDAR";
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events.ics"),
            &EventsCache::default(),
            &raw_fetch(ics),
            &rules(),
        );

        assert_eq!(row.source_type, SourceType::Ics);
        assert_eq!(row.source_event_count, 1);
        assert_eq!(row.cache_event_count, 0);
        assert_eq!(row.missing_count, 1);
        assert_eq!(row.extra_count, 0);
        assert_eq!(row.coverage_ratio, Some(0.0));
        assert_eq!(row.confidence, Confidence::High);
        assert_eq!(row.missing_examples.len(), 1);
    }

    #[test]
    fn audit_degrades_when_both_fetches_fail() {
        let fetched = FetchResult {
            jina_error: Some("Request timed out".to_string()),
            raw_error: Some("Request timed out".to_string()),
            ..FetchResult::default()
        };
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events.ics"),
            &EventsCache::default(),
            &fetched,
            &rules(),
        );

        assert_eq!(row.source_event_count, 0);
        assert_eq!(row.coverage_ratio, None);
        assert_eq!(row.confidence, Confidence::Unknown);
        assert!(row.fetch_errors.jina_error);
        assert!(row.fetch_errors.raw_error);
        assert_eq!(
            row.fetch_errors.raw_error_detail.as_deref(),
            Some("Request timed out")
        );
    }

    #[test]
    fn audit_collapses_same_url_with_different_titles() {
        let html = r#"<a href="/events/jazz-night">Tonight!</a>"#;
        let cache = cache_from(
            r#"{"venues": {"venue.org": {
                "venueName": "The Venue", "category": "music", "city": "Oakland",
                "events": [
                    {"eventUrl": "https://www.venue.org/events/jazz-night/", "title": "A Completely Different Title"}
                ]}}}"#,
        );
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events"),
            &cache,
            &raw_fetch(html),
            &rules(),
        );

        assert_eq!(row.source_event_count, 1);
        assert_eq!(row.cache_event_count, 1);
        assert_eq!(row.intersection_count, 1);
        assert_eq!(row.missing_count, 0);
        assert_eq!(row.extra_count, 0);
        assert_eq!(row.coverage_ratio, Some(1.0));
        assert_eq!(row.confidence, Confidence::None);
    }

    #[test]
    fn audit_counts_satisfy_row_invariants() {
        let html = r#"<a href="/events/a">x</a> <a href="/events/b">x</a> <a href="/events/c">x</a>"#;
        let cache = cache_from(
            r#"{"venues": {"venue.org": {
                "venueName": "The Venue", "category": "music", "city": "Oakland",
                "events": [
                    {"eventUrl": "https://venue.org/events/b"},
                    {"eventUrl": "https://venue.org/events/zzz"}
                ]}}}"#,
        );
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events"),
            &cache,
            &raw_fetch(html),
            &rules(),
        );

        assert_eq!(
            row.missing_count + row.intersection_count,
            row.source_event_count
        );
        assert_eq!(row.extra_count + row.intersection_count, row.cache_event_count);
        let coverage = row.coverage_ratio.unwrap();
        assert!((0.0..=1.0).contains(&coverage));
        // 3 source, 1 shared with a 2-event cache.
        assert_eq!(row.source_event_count, 3);
        assert_eq!(row.missing_count, 2);
        assert_eq!(row.extra_count, 1);
        assert_eq!(row.coverage_ratio, Some(0.3333));
    }

    #[test]
    fn audit_prefers_reader_body_for_ics_when_present() {
        let jina_ics = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nSUMMARY:From Reader\nEND:VEVENT\nEND:VCALENDAR";
        let raw_ics = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nSUMMARY:From Raw A\nEND:VEVENT\nBEGIN:VEVENT\nSUMMARY:From Raw B\nEND:VEVENT\nEND:VCALENDAR";
        let fetched = FetchResult {
            jina_text: Some(jina_ics.to_string()),
            raw_text: Some(raw_ics.to_string()),
            ..FetchResult::default()
        };
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events.ics"),
            &EventsCache::default(),
            &fetched,
            &rules(),
        );
        assert_eq!(row.source_event_count, 1);
        assert_eq!(row.missing_examples, vec!["title::from reader::date::"]);
    }

    #[test]
    fn audit_finds_cache_entry_across_www_prefix() {
        let html = r#"<a href="/events/a">x</a>"#;
        let cache = cache_from(
            r#"{"venues": {"www.venue.org": {
                "venueName": "The Venue", "category": "music", "city": "Oakland",
                "events": [{"eventUrl": "https://venue.org/events/a"}]}}}"#,
        );
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events"),
            &cache,
            &raw_fetch(html),
            &rules(),
        );
        assert_eq!(row.cache_event_count, 1);
        assert_eq!(row.intersection_count, 1);
    }

    #[test]
    fn audit_treats_null_cache_entry_as_absent() {
        let cache = cache_from(r#"{"venues": {"venue.org": null}}"#);
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events"),
            &cache,
            &raw_fetch(r#"<a href="/events/a">x</a>"#),
            &rules(),
        );
        assert_eq!(row.cache_event_count, 0);
        assert_eq!(row.missing_count, 1);
        assert!(!row.quality_flags.stale_metadata);
    }

    #[test]
    fn audit_bounds_example_lists() {
        let hrefs: String = (0..30)
            .map(|i| format!(r#"<a href="/events/show-{i}">x</a>"#))
            .collect();
        let row = audit_venue(
            &venue("venue.org", "https://venue.org/events"),
            &EventsCache::default(),
            &raw_fetch(&hrefs),
            &rules(),
        );
        assert_eq!(row.source_event_count, 30);
        assert_eq!(row.missing_count, 30);
        assert_eq!(row.missing_examples.len(), 20);
        // Display form strips the url:: prefix.
        assert!(row.missing_examples[0].starts_with("https://venue.org/events/"));
    }
}
