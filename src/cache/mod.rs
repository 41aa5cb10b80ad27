//! Short-lived key/value memoization.
//!
//! Entries expire a fixed time after insertion regardless of access. Expiry
//! is logical: `get` treats an expired entry as absent even if the sweeper
//! has not removed it yet. Invalidation is coarse on purpose: writers that
//! touch cached aggregates call `flush_all` instead of guessing which keys
//! reference the changed rows.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<V = serde_json::Value> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        // Lazy-expire on read; the sweeper is only a memory bound.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Insert with a per-entry lifetime instead of the cache default.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Remove one key; returns whether a live entry was removed.
    pub fn del(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now)
    }

    pub fn flush_all(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Physically drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Run `purge_expired` every `period` until `cancel` fires. Periods
    /// shorter than `MIN_SWEEP_PERIOD` are raised to it.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        if period < MIN_SWEEP_PERIOD {
            warn!(?period, "sweep period too short, using {:?}", MIN_SWEEP_PERIOD);
        }
        let period = period.max(MIN_SWEEP_PERIOD);
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "cache sweep");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests;
