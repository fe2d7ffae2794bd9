//! Cached venue-events lookup and key derivation.

use crate::normalize::{canonicalize_url, make_event_key, normalize_host};
use crate::types::{CacheVenueEntry, CachedEvent, CanonicalEvent, EventsCache};

/// Look up a venue's cached entry: exact domain key first, then a
/// host-normalized scan across all keys (registries and caches disagree on
/// `www.` prefixes). An absent or null venue is valid input, not an error.
pub fn lookup_venue<'a>(cache: &'a EventsCache, domain: &str) -> Option<&'a CacheVenueEntry> {
    if let Some(entry) = cache.venues.get(domain) {
        return entry.as_ref();
    }
    let target = normalize_host(domain);
    cache
        .venues
        .iter()
        .find(|(key, _)| normalize_host(key) == target)
        .and_then(|(_, entry)| entry.as_ref())
}

/// Derive comparable events from a venue's cached entries. Cached events are
/// not deduplicated; repeats show up in the quality flags instead.
pub fn parse_events(cache_events: &[CachedEvent], calendar_url: &str) -> Vec<CanonicalEvent> {
    cache_events
        .iter()
        .map(|event| CanonicalEvent {
            key: make_event_key(
                event.event_url.as_deref(),
                event.title.as_deref(),
                event.start_date.as_deref(),
                Some(calendar_url),
            ),
            event_url: canonicalize_url(
                event.event_url.as_deref().unwrap_or(""),
                Some(calendar_url),
            ),
            title: event.title.clone(),
            start_date: event.start_date.clone(),
        })
        .collect()
}
