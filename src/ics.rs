//! ICS calendar feed parsing.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::{canonicalize_url, is_same_site, make_event_key};
use crate::types::CanonicalEvent;

static BARE_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap());
static DATE_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})T(\d{2})(\d{2})(\d{2})?Z?$").unwrap());

/// Undo RFC5545 line folding: a line starting with space or tab continues the
/// previous line, minus the one leading whitespace character.
pub fn unfold_lines(ics_text: &str) -> Vec<String> {
    let normalized = ics_text.replace("\r\n", "\n").replace('\r', "\n");
    let mut unfolded: Vec<String> = Vec::new();
    for line in normalized.split('\n') {
        match unfolded.last_mut() {
            Some(last) if line.starts_with(' ') || line.starts_with('\t') => {
                last.push_str(&line[1..]);
            }
            _ => unfolded.push(line.to_string()),
        }
    }
    unfolded
}

/// Undo the basic ICS backslash escapes.
pub fn decode_value(value: &str) -> String {
    value
        .replace("\\n", " ")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
        .trim()
        .to_string()
}

/// Parse a DTSTART value: bare dates become midnight, date-times keep their
/// local clock reading. A trailing `Z` maps to the same naive representation;
/// timezones are intentionally not modeled here.
pub fn parse_datetime(raw: &str) -> Option<String> {
    let value = raw.trim();

    if let Some(caps) = BARE_DATE_RE.captures(value) {
        return Some(format!("{}-{}-{}T00:00:00", &caps[1], &caps[2], &caps[3]));
    }

    if let Some(caps) = DATE_TIME_RE.captures(value) {
        let seconds = caps.get(6).map_or("00", |m| m.as_str());
        return Some(format!(
            "{}-{}-{}T{}:{}:{}",
            &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], seconds
        ));
    }

    None
}

/// Extract canonical events from an ICS body.
///
/// Within a `VEVENT` block each `FIELD[;params]:VALUE` line records the field
/// with its parameter suffix discarded, last occurrence winning. Lines without
/// a colon are skipped. Cancelled events are dropped; an event URL that
/// resolves off-site is discarded (the event itself survives if titled);
/// events are deduplicated by key, first occurrence winning.
pub fn parse_events(ics_text: &str, calendar_url: &str, domain: &str) -> Vec<CanonicalEvent> {
    let mut current: Option<HashMap<String, String>> = None;
    let mut blocks: Vec<HashMap<String, String>> = Vec::new();

    for line in unfold_lines(ics_text) {
        if line == "BEGIN:VEVENT" {
            current = Some(HashMap::new());
            continue;
        }
        if line == "END:VEVENT" {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }
        let Some(block) = current.as_mut() else {
            continue;
        };
        let Some((left, value)) = line.split_once(':') else {
            continue;
        };
        let field = left.split(';').next().unwrap_or(left).to_uppercase();
        block.insert(field, value.to_string());
    }

    let mut out = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for block in blocks {
        let status = block
            .get("STATUS")
            .map(|status| status.trim().to_uppercase())
            .unwrap_or_default();
        if status == "CANCELLED" {
            continue;
        }

        let title = decode_value(block.get("SUMMARY").map_or("", String::as_str));
        let start_date = parse_datetime(block.get("DTSTART").map_or("", String::as_str));
        let raw_url = decode_value(block.get("URL").map_or("", String::as_str));
        let mut event_url = canonicalize_url(&raw_url, Some(calendar_url));

        // An off-site URL is a worse identity signal than none.
        if let Some(url) = &event_url {
            if !is_same_site(url, domain) {
                event_url = None;
            }
        }

        if title.is_empty() && event_url.is_none() {
            continue;
        }

        let key = make_event_key(
            event_url.as_deref(),
            Some(&title),
            start_date.as_deref(),
            Some(calendar_url),
        );
        if !seen_keys.insert(key.clone()) {
            continue;
        }

        out.push(CanonicalEvent {
            key,
            event_url,
            title: (!title.is_empty()).then_some(title),
            start_date,
        });
    }

    out
}
