//! Event extraction from HTML and reader-rendered Markdown bodies.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::heuristics::PathHeuristics;
use crate::normalize::{
    canonicalize_url, infer_start_date_from_url, infer_title_from_url, is_same_site,
    make_event_key,
};
use crate::types::CanonicalEvent;

static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*['"]([^'"]+)['"]"#).unwrap());
static MD_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").unwrap());
static BARE_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s)\]>"']+"#).unwrap());

/// Pull `href="..."` values out of raw HTML.
pub fn extract_hrefs(html_text: &str) -> Vec<String> {
    HREF_RE
        .captures_iter(html_text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Pull `[text](url)` pairs out of Markdown.
pub fn extract_markdown_links(md_text: &str) -> Vec<(String, String)> {
    MD_LINK_RE
        .captures_iter(md_text)
        .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
        .collect()
}

/// Pull bare `http(s)://` URLs out of text, trimming trailing punctuation.
pub fn extract_bare_urls(text: &str) -> Vec<String> {
    BARE_URL_RE
        .find_iter(text)
        .map(|found| {
            found
                .as_str()
                .trim_end_matches(['.', ',', ';', ')'])
                .to_string()
        })
        .collect()
}

/// Harvest candidate event links from the two fetched bodies.
///
/// Candidate order is raw-HTML hrefs, then Markdown links from the rendered
/// body, then bare URLs from the rendered body; each is canonicalized,
/// filtered to same-site, and filtered by the path heuristic. A Markdown link
/// keeps its text as title, everything else infers a title from the URL.
/// Deduplicated by key, first occurrence winning.
pub fn parse_events(
    calendar_url: &str,
    domain: &str,
    raw_text: &str,
    jina_text: &str,
    heuristics: &PathHeuristics,
) -> Vec<CanonicalEvent> {
    let mut candidates: Vec<(Option<String>, String)> = Vec::new();

    for href in extract_hrefs(raw_text) {
        candidates.push((None, href));
    }
    for (title, link) in extract_markdown_links(jina_text) {
        candidates.push(((!title.is_empty()).then_some(title), link));
    }
    for bare in extract_bare_urls(jina_text) {
        candidates.push((None, bare));
    }

    let mut out = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for (title, candidate) in candidates {
        let Some(canonical) = canonicalize_url(&candidate, Some(calendar_url)) else {
            continue;
        };
        if !is_same_site(&canonical, domain) {
            continue;
        }
        if !heuristics.likely_event_url(&canonical) {
            continue;
        }

        let inferred_title = title.unwrap_or_else(|| infer_title_from_url(&canonical));
        let start_date = infer_start_date_from_url(&canonical);
        let key = make_event_key(
            Some(&canonical),
            Some(&inferred_title),
            start_date.as_deref(),
            Some(calendar_url),
        );

        if !seen_keys.insert(key.clone()) {
            continue;
        }

        out.push(CanonicalEvent {
            key,
            event_url: Some(canonical),
            title: (!inferred_title.is_empty()).then_some(inferred_title),
            start_date,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAL: &str = "https://venue.org/events";

    fn rules() -> PathHeuristics {
        PathHeuristics::standard()
    }

    // --- extractors ---

    #[test]
    fn hrefs_are_extracted_from_attributes() {
        let html = r#"<a href="/events/a">A</a> <A HREF='https://venue.org/events/b'>B</A>"#;
        assert_eq!(
            extract_hrefs(html),
            vec!["/events/a", "https://venue.org/events/b"]
        );
    }

    #[test]
    fn markdown_links_carry_their_text() {
        let md = "[Jazz Night](https://venue.org/events/jazz) and [](https://venue.org/events/x)";
        assert_eq!(
            extract_markdown_links(md),
            vec![
                ("Jazz Night".to_string(), "https://venue.org/events/jazz".to_string()),
                ("".to_string(), "https://venue.org/events/x".to_string()),
            ]
        );
    }

    #[test]
    fn bare_urls_lose_trailing_punctuation() {
        let text = "See https://venue.org/events/gala. Also https://venue.org/events/jazz,";
        assert_eq!(
            extract_bare_urls(text),
            vec!["https://venue.org/events/gala", "https://venue.org/events/jazz"]
        );
    }

    // --- parse_events ---

    #[test]
    fn extractor_keeps_same_site_event_links_only() {
        let raw = r#"<a href="/events/jazz-night">x</a>
                     <a href="https://other.org/events/foreign">x</a>
                     <a href="/about">x</a>
                     <a href="mailto:box@venue.org">x</a>"#;
        let events = parse_events(CAL, "venue.org", raw, "", &rules());
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_url.as_deref(),
            Some("https://venue.org/events/jazz-night")
        );
    }

    #[test]
    fn extractor_prefers_markdown_title_and_infers_otherwise() {
        let jina = "[Jazz Night](https://venue.org/events/jazz-night)\nhttps://venue.org/events/gala-dinner";
        let events = parse_events(CAL, "venue.org", "", jina, &rules());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title.as_deref(), Some("Jazz Night"));
        assert_eq!(events[1].title.as_deref(), Some("Gala Dinner"));
    }

    #[test]
    fn extractor_infers_assumed_evening_start_from_date_path() {
        let raw = r#"<a href="/whatson/2025-09-01">x</a>"#;
        let events = parse_events(CAL, "venue.org", raw, "", &rules());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_date.as_deref(), Some("2025-09-01T19:00:00"));
    }

    #[test]
    fn extractor_dedupes_with_raw_html_precedence() {
        let raw = r#"<a href="/events/jazz-night">x</a>"#;
        let jina = "[Jazz Night Special](https://venue.org/events/jazz-night)";
        let events = parse_events(CAL, "venue.org", raw, jina, &rules());
        assert_eq!(events.len(), 1);
        // The raw-HTML candidate came first, so its inferred title wins.
        assert_eq!(events[0].title.as_deref(), Some("Jazz Night"));
    }

    #[test]
    fn extractor_resolves_relative_hrefs_against_calendar_url() {
        let raw = r#"<a href="jazz-night">x</a>"#;
        let events = parse_events("https://venue.org/events/", "venue.org", raw, "", &rules());
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_url.as_deref(),
            Some("https://venue.org/events/jazz-night")
        );
    }

    #[test]
    fn extractor_returns_nothing_for_empty_bodies() {
        assert!(parse_events(CAL, "venue.org", "", "", &rules()).is_empty());
    }
}
