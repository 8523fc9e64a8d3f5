//! Read-path cache strategy.

use chrono::{DateTime, Duration, Utc};

/// Controls whether a collection read is served from the local cache or
/// refreshed from the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStrategy {
    pub max_age_minutes: i64,
    pub force_refresh: bool,
    pub offline_first: bool,
}

impl Default for CacheStrategy {
    fn default() -> Self {
        Self {
            max_age_minutes: 30,
            force_refresh: false,
            offline_first: false,
        }
    }
}

impl CacheStrategy {
    /// Always hit the remote store while online.
    pub fn always_fresh() -> Self {
        Self {
            max_age_minutes: 0,
            force_refresh: true,
            offline_first: false,
        }
    }

    /// Tolerate a two-hour-old cache.
    pub fn long_cache() -> Self {
        Self {
            max_age_minutes: 120,
            ..Self::default()
        }
    }

    pub fn offline_first() -> Self {
        Self {
            max_age_minutes: 60,
            force_refresh: false,
            offline_first: true,
        }
    }

    /// Near-real-time reads for the daily dashboard.
    pub fn today() -> Self {
        Self {
            max_age_minutes: 5,
            force_refresh: true,
            offline_first: false,
        }
    }
}

/// True when a `cached_at` timestamp is still within the max-age window.
/// A missing timestamp always counts as stale.
pub fn is_fresh(cached_at: Option<DateTime<Utc>>, max_age_minutes: i64, now: DateTime<Utc>) -> bool {
    match cached_at {
        Some(ts) => now - ts <= Duration::minutes(max_age_minutes),
        None => false,
    }
}
