//! Failure classification, retry ceilings and backoff math for the sync engine.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Periodic scheduler tick in seconds.
pub const SYNC_TICK_INTERVAL_SECS: u64 = 60;

/// Base delay for the automatic-retry backoff.
pub const SYNC_BACKOFF_BASE_MS: u64 = 30_000;

/// Ceiling for the automatic-retry backoff.
pub const SYNC_BACKOFF_MAX_MS: u64 = 30 * 60 * 1000;

/// Classification of a failed remote operation, driving its retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFailureKind {
    /// No connectivity at call time.
    NetworkUnavailable,
    /// 5xx-class remote fault.
    RemoteTransient,
    /// 401/403; the remote client is reinitialized before the next attempt.
    RemoteAuth,
    /// Duplicate-key on create. The record already exists remotely, so the
    /// caller treats this as success.
    RemoteConflict,
    /// Referenced employee missing remotely and not resolvable locally.
    DependencyUnresolved,
    /// Per-item timeout expiry; the request outcome is unknown.
    Timeout,
    /// Anything else (4xx validation failures and the like).
    Generic,
}

impl SyncFailureKind {
    /// Number of attempts after which a queued item is dropped.
    ///
    /// Conflicts never consume retries; callers remove the item as a success
    /// before consulting this.
    pub fn retry_ceiling(&self) -> i32 {
        match self {
            Self::NetworkUnavailable | Self::DependencyUnresolved | Self::Timeout => 5,
            Self::RemoteTransient => 4,
            Self::RemoteAuth | Self::RemoteConflict | Self::Generic => 3,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RemoteConflict)
    }
}

/// Classify a failed remote call from its HTTP-like status and message.
///
/// Transport errors arrive without a status and are treated as network
/// failures. Duplicate-key inserts surface either as 409 or as a Postgres
/// `23505` code embedded in the message body.
pub fn classify_remote_failure(status: Option<u16>, message: &str) -> SyncFailureKind {
    match status {
        Some(401) | Some(403) => SyncFailureKind::RemoteAuth,
        Some(409) => SyncFailureKind::RemoteConflict,
        Some(code) if (500..=599).contains(&code) => SyncFailureKind::RemoteTransient,
        Some(code) if code == 408 => SyncFailureKind::Timeout,
        Some(_) => {
            let lowered = message.to_lowercase();
            if lowered.contains("23505") || lowered.contains("duplicate") {
                SyncFailureKind::RemoteConflict
            } else {
                SyncFailureKind::Generic
            }
        }
        None => SyncFailureKind::NetworkUnavailable,
    }
}

/// Delay before the next automatic sync attempt.
///
/// Zero after a success; otherwise 30s doubling per consecutive failure up
/// to 30 minutes, with ±20% jitter so reconnecting devices do not stampede
/// the remote store.
pub fn calculate_sync_delay(consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }

    let exponent = (consecutive_failures - 1).min(16);
    let base = SYNC_BACKOFF_BASE_MS
        .saturating_mul(1u64 << exponent)
        .min(SYNC_BACKOFF_MAX_MS);
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((base as f64 * jitter) as u64)
}

/// Aggregate counters surfaced to the diagnostics screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_items: usize,
    pub success_count: usize,
    pub error_count: usize,
}

/// Outcome of one bounded `batch_sync` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncOutcome {
    pub success: usize,
    pub error: usize,
    pub remaining: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_for_retry_policy() {
        assert_eq!(
            classify_remote_failure(Some(503), "service unavailable"),
            SyncFailureKind::RemoteTransient
        );
        assert_eq!(
            classify_remote_failure(Some(401), "unauthorized"),
            SyncFailureKind::RemoteAuth
        );
        assert_eq!(
            classify_remote_failure(Some(409), "conflict"),
            SyncFailureKind::RemoteConflict
        );
        assert_eq!(
            classify_remote_failure(Some(400), "duplicate key value violates 23505"),
            SyncFailureKind::RemoteConflict
        );
        assert_eq!(
            classify_remote_failure(Some(422), "invalid payload"),
            SyncFailureKind::Generic
        );
        assert_eq!(
            classify_remote_failure(None, "connection refused"),
            SyncFailureKind::NetworkUnavailable
        );
    }

    #[test]
    fn ceilings_follow_error_class() {
        assert_eq!(SyncFailureKind::Generic.retry_ceiling(), 3);
        assert_eq!(SyncFailureKind::RemoteTransient.retry_ceiling(), 4);
        assert_eq!(SyncFailureKind::NetworkUnavailable.retry_ceiling(), 5);
        assert_eq!(SyncFailureKind::DependencyUnresolved.retry_ceiling(), 5);
    }

    #[test]
    fn backoff_is_zero_after_success() {
        assert_eq!(calculate_sync_delay(0), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_within_jitter_bounds() {
        for (failures, expected_ms) in [(1u32, 30_000u64), (2, 60_000), (3, 120_000)] {
            let delay = calculate_sync_delay(failures).as_millis() as u64;
            let lower = expected_ms * 8 / 10;
            let upper = expected_ms * 12 / 10;
            assert!(
                (lower..=upper).contains(&delay),
                "failures={failures} delay={delay}ms outside [{lower}, {upper}]"
            );
        }
    }

    #[test]
    fn backoff_caps_at_thirty_minutes() {
        let delay = calculate_sync_delay(30).as_millis() as u64;
        assert!(delay <= SYNC_BACKOFF_MAX_MS * 12 / 10);
        assert!(delay >= SYNC_BACKOFF_MAX_MS * 8 / 10);
    }
}
