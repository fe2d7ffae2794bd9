//! Path-likelihood heuristics for deciding whether a same-site URL points at
//! an individual event page.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static DATE_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d{4}-\d{2}-\d{2}(?:/\d+)?/?$").unwrap());

/// Paths that contain one of these are likely individual event pages.
const INCLUDE_PATTERNS: &[&str] = &[
    r"/event/",
    r"/events/",
    r"/show/",
    r"/shows/",
    r"/ticket",
    r"/buy-tickets",
    r"/tm-event/",
    r"/programs?/",
];

/// Listing, feed, and utility paths that must never count as events, checked
/// before the include list so `/events/category/...` loses to its exclusion.
const EXCLUDE_PATTERNS: &[&str] = &[
    r"/events?$",
    r"/events/page/\d+/?$",
    r"/events/(feed|month|list|map|day|week|calendar)/?",
    r"/events/(category|tag|venue|organizer)/",
    r"/events/v\d+/?$",
    r"/wp-json",
    r"/api/",
    r"/rss",
    r"/search",
    r"/cart",
    r"/checkout",
    r"/login",
    r"/signup",
];

/// Include/exclude rule sets for `likely_event_url`, passed in wherever the
/// HTML extractor runs so tests can substitute custom rules.
///
/// Patterns match anywhere in the lowercased URL path.
#[derive(Debug, Clone)]
pub struct PathHeuristics {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PathHeuristics {
    /// The standard rule set used by the audit CLI.
    pub fn standard() -> Self {
        Self::from_patterns(INCLUDE_PATTERNS, EXCLUDE_PATTERNS).unwrap()
    }

    /// Build a rule set from raw pattern lists.
    pub fn from_patterns(include: &[&str], exclude: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            include: include
                .iter()
                .map(|pattern| Regex::new(pattern))
                .collect::<Result<_, _>>()?,
            exclude: exclude
                .iter()
                .map(|pattern| Regex::new(pattern))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Whether the URL's path looks like an individual event page.
    ///
    /// Exclusions win over inclusions; a path ending in a date segment counts
    /// regardless of the include list. Unparseable URLs are excluded.
    pub fn likely_event_url(&self, url: &str) -> bool {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => return false,
        };

        if self.exclude.iter().any(|pattern| pattern.is_match(&path)) {
            return false;
        }
        if DATE_TAIL_RE.is_match(&path) {
            return true;
        }
        self.include.iter().any(|pattern| pattern.is_match(&path))
    }
}
