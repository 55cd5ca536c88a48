//! # Windowed Rate Limiting
//!
//! Fixed-window counters keyed by `tool:scope:identity:bucket`, where the
//! bucket is `floor(now / window_seconds)`. A counter is created lazily on
//! the first call in its bucket and expires at the bucket's end.
//!
//! The check and the increment are a single [`CounterStore::increment_below`]
//! call, so concurrent callers can never push a counter past its limit.
//!
//! Bucket numbers are part of the key, so a key is never revisited once its
//! window closes. [`InMemoryCounterStore`] sweeps expired counters every
//! [`DEFAULT_SWEEP_INTERVAL`] calls to keep the map bounded by the number
//! of live windows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use toolgate_core::{Clock, ToolName};

/// Window length for per-hour scopes.
pub const HOUR_SECONDS: i64 = 3_600;
/// Window length for per-day scopes.
pub const DAY_SECONDS: i64 = 86_400;
/// Calls between sweeps of expired in-memory counters.
pub const DEFAULT_SWEEP_INTERVAL: u64 = 256;

/// A rate-limit scope from the policy's `rate_limits` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Per actor per hour.
    PerHour,
    /// Per actor per day.
    PerDay,
    /// Per client IP per hour.
    PerIpHour,
}

impl RateLimitScope {
    /// The scope's key in the policy document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerHour => "per_hour",
            Self::PerDay => "per_day",
            Self::PerIpHour => "per_ip_hour",
        }
    }

    /// Length of the scope's window.
    pub fn window_seconds(&self) -> i64 {
        match self {
            Self::PerHour | Self::PerIpHour => HOUR_SECONDS,
            Self::PerDay => DAY_SECONDS,
        }
    }
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Counter storage
// ---------------------------------------------------------------------------

/// Failure of the backing counter store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterStoreError {
    /// The store could not be reached or refused the operation.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an atomic compare-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOutcome {
    /// Whether the counter was below the limit and was incremented.
    pub incremented: bool,
    /// The counter value after the operation.
    pub count: u64,
}

/// Persistence for windowed counters.
pub trait CounterStore: Send + Sync {
    /// Increment the counter at `key` if it is below `limit`.
    ///
    /// A missing or expired counter starts at zero and expires at
    /// `expires_at`. The comparison and the increment must be atomic with
    /// respect to other calls on the same key.
    fn increment_below(
        &self,
        key: &str,
        limit: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CounterOutcome, CounterStoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    window_start: DateTime<Utc>,
    count: u64,
    expires_at: DateTime<Utc>,
}

/// In-process counter store on a sharded concurrent map.
///
/// The dashmap entry guard holds the shard's write lock across the compare
/// and the increment. Expired counters are swept lazily from the request
/// path, once every `sweep_interval` calls.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
    calls: AtomicU64,
    sweep_interval: u64,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl InMemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that sweeps expired counters every `interval`
    /// calls. An interval of zero is treated as one.
    pub fn with_sweep_interval(interval: u64) -> Self {
        Self {
            counters: DashMap::new(),
            calls: AtomicU64::new(0),
            sweep_interval: interval.max(1),
        }
    }

    // Runs before the entry guard is taken: `retain` locks every shard.
    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % self.sweep_interval == 0 {
            let removed = self.purge_expired(now);
            if removed > 0 {
                tracing::trace!(removed, live = self.counters.len(), "expired counters swept");
            }
        }
    }

    /// Drop every counter that has expired at `now`. Returns how many were
    /// removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, c| c.expires_at > now);
        before.saturating_sub(self.counters.len())
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counters are held.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Current count at `key`, if a live counter exists.
    pub fn count(&self, key: &str, now: DateTime<Utc>) -> Option<u64> {
        self.counters
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| c.count)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment_below(
        &self,
        key: &str,
        limit: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CounterOutcome, CounterStoreError> {
        self.maybe_sweep(now);
        let fresh = |count| Counter {
            window_start: now,
            count,
            expires_at,
        };
        match self.counters.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                if limit == 0 {
                    return Ok(CounterOutcome {
                        incremented: false,
                        count: 0,
                    });
                }
                slot.insert(fresh(1));
                Ok(CounterOutcome {
                    incremented: true,
                    count: 1,
                })
            }
            Entry::Occupied(mut slot) => {
                let counter = slot.get_mut();
                if counter.expires_at <= now {
                    *counter = fresh(0);
                }
                if counter.count >= limit {
                    return Ok(CounterOutcome {
                        incremented: false,
                        count: counter.count,
                    });
                }
                counter.count += 1;
                tracing::trace!(
                    key,
                    count = counter.count,
                    since = %counter.window_start,
                    "counter incremented"
                );
                Ok(CounterOutcome {
                    incremented: true,
                    count: counter.count,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    /// Whether the limit was already reached. No increment happened if so.
    pub exceeded: bool,
    /// The counter value after the check.
    pub current: u64,
    /// The configured limit.
    pub limit: u64,
}

/// Fixed-window rate limiter over a [`CounterStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter over `store`, reading time from `clock`.
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The counter key for a call at `now`.
    pub fn counter_key(
        tool: &ToolName,
        scope: &str,
        identity: &str,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> String {
        let window = window_seconds.max(1);
        let bucket = now.timestamp().div_euclid(window);
        format!("{tool}:{scope}:{identity}:{bucket}")
    }

    /// Count one call against `limit` in the current bucket.
    ///
    /// If the counter has already reached `limit` the call is reported as
    /// exceeded and the counter is left unchanged.
    pub fn check_and_increment(
        &self,
        tool: &ToolName,
        scope: &str,
        identity: &str,
        limit: u64,
        window_seconds: i64,
    ) -> Result<RateLimitOutcome, CounterStoreError> {
        let now = self.clock.now();
        let window = window_seconds.max(1);
        let key = Self::counter_key(tool, scope, identity, window, now);
        let bucket_end = (now.timestamp().div_euclid(window) + 1).saturating_mul(window);
        let expires_at = DateTime::<Utc>::from_timestamp(bucket_end, 0).unwrap_or(now);

        let outcome = self.store.increment_below(&key, limit, expires_at, now)?;
        if !outcome.incremented {
            tracing::debug!(%tool, scope, identity, limit, "rate limit reached");
        }
        Ok(RateLimitOutcome {
            exceeded: !outcome.incremented,
            current: outcome.count,
            limit,
        })
    }

    /// Check a policy scope using its standard window.
    pub fn check_scope(
        &self,
        tool: &ToolName,
        scope: RateLimitScope,
        identity: &str,
        limit: u64,
    ) -> Result<RateLimitOutcome, CounterStoreError> {
        self.check_and_increment(tool, scope.as_str(), identity, limit, scope.window_seconds())
    }
}
