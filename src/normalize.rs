//! URL and key normalization: the identity layer shared by every audit stage.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static MULTI_SLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TITLE_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static ISO_DATE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());
static COMPACT_DATE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}").unwrap());
static ALL_DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static DATE_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static TRAILING_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{4})-(\d{2})-(\d{2})(?:/\d+)?/?$").unwrap());

/// Lowercase a hostname and strip a leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let normalized = host.trim().to_lowercase();
    normalized
        .strip_prefix("www.")
        .map(str::to_string)
        .unwrap_or(normalized)
}

/// Normalize an href or bare URL into a comparable absolute form.
///
/// Returns `None` for empty, `mailto:`/`tel:`/`javascript:`, fragment-only,
/// non-http(s), and hostless candidates. That is a filtering signal, not an
/// error.
/// The query string and fragment are discarded so tracking parameters cannot
/// create false distinctness between otherwise identical event URLs.
pub fn canonicalize_url(candidate: &str, base_url: Option<&str>) -> Option<String> {
    let raw = candidate.trim();
    if raw.is_empty() {
        return None;
    }

    let lowered = raw.to_lowercase();
    if lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("javascript:")
        || lowered.starts_with('#')
    {
        return None;
    }

    let absolute;
    let raw = if let Some(rest) = raw.strip_prefix("//") {
        absolute = format!("https://{rest}");
        absolute.as_str()
    } else {
        raw
    };

    let parsed = match Url::parse(raw) {
        Ok(parsed) => parsed,
        Err(_) => Url::parse(base_url?).ok()?.join(raw).ok()?,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = normalize_host(parsed.host_str().unwrap_or(""));
    if host.is_empty() {
        return None;
    }

    // Url::parse already drops default ports, so any port here is explicit
    // and non-default.
    let netloc = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };

    let collapsed = MULTI_SLASH_RE.replace_all(parsed.path(), "/");
    let path = if collapsed == "/" {
        "/"
    } else {
        collapsed.trim_end_matches('/')
    };

    Some(format!("{}://{}{}", parsed.scheme(), netloc, path))
}

/// Whether a URL belongs to the venue's registered domain: equal hosts, or a
/// dot-suffix subdomain relationship in either direction. Parse failures are
/// treated as off-site.
pub fn is_same_site(url: &str, domain: &str) -> bool {
    let host = match Url::parse(url) {
        Ok(parsed) => normalize_host(parsed.host_str().unwrap_or("")),
        Err(_) => return false,
    };
    let target = normalize_host(domain);
    if host.is_empty() || target.is_empty() {
        return false;
    }
    host == target
        || host.ends_with(&format!(".{target}"))
        || target.ends_with(&format!(".{host}"))
}

/// Lowercase, collapse whitespace, keep only `[a-z0-9 -]`.
pub fn normalize_title_for_key(title: &str) -> String {
    let lowered = title.to_lowercase();
    let collapsed = WHITESPACE_RE.replace_all(lowered.trim(), " ");
    let stripped = TITLE_KEY_RE.replace_all(&collapsed, "");
    stripped.trim().to_string()
}

/// Reduce a date-ish string to `YYYY-MM-DD` when possible, else lowercase it.
pub fn normalize_date_for_key(value: &str) -> String {
    let raw = value.trim();
    if let Some(found) = ISO_DATE_PREFIX_RE.find(raw) {
        return found.as_str().to_string();
    }
    if let Some(found) = COMPACT_DATE_PREFIX_RE.find(raw) {
        let digits = found.as_str();
        return format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8]);
    }
    raw.to_lowercase()
}

/// Stable identity key for an event: the canonical URL when one resolves,
/// else a normalized title+date composite. Two events with neither collide by
/// design.
pub fn make_event_key(
    event_url: Option<&str>,
    title: Option<&str>,
    start_date: Option<&str>,
    base_url: Option<&str>,
) -> String {
    if let Some(canonical) = canonicalize_url(event_url.unwrap_or(""), base_url) {
        return format!("url::{canonical}");
    }
    let title_part = normalize_title_for_key(title.unwrap_or(""));
    let date_part = normalize_date_for_key(start_date.unwrap_or(""));
    format!("title::{title_part}::date::{date_part}")
}

/// Display form of a key: URL keys lose their prefix, title keys stay as-is.
pub fn key_to_display(key: &str) -> &str {
    key.strip_prefix("url::").unwrap_or(key)
}

/// Infer a display title from the last meaningful path segment of a URL.
/// Numeric or date-shaped trailing segments defer to the preceding segment.
pub fn infer_title_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => return String::new(),
    };
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let Some(&last) = parts.last() else {
        return String::new();
    };

    let mut tail = last;
    if (ALL_DIGITS_RE.is_match(tail) || DATE_SEGMENT_RE.is_match(tail)) && parts.len() > 1 {
        tail = parts[parts.len() - 2];
    }
    if tail.is_empty() {
        return String::new();
    }

    let spaced = tail.replace('-', " ");
    let collapsed = WHITESPACE_RE.replace_all(spaced.trim(), " ").into_owned();
    title_case(&collapsed)
}

/// Infer a start date from a path ending in `/YYYY-MM-DD` or
/// `/YYYY-MM-DD/<id>`. The 19:00 start is an assumption, not an extraction:
/// such paths carry no time, and an evening start is the common case.
pub fn infer_start_date_from_url(url: &str) -> Option<String> {
    let path = Url::parse(url).ok()?.path().to_string();
    let caps = TRAILING_DATE_RE.captures(&path)?;
    Some(format!("{}-{}-{}T19:00:00", &caps[1], &caps[2], &caps[3]))
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
