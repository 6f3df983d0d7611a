//! Counters for cache and provider activity.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters.
#[derive(Debug, Default)]
pub struct FxMetrics {
    /// Requests answered from the rate store.
    pub cache_hits: AtomicU64,
    /// Requests that had to go to providers.
    pub cache_misses: AtomicU64,
    /// Provider operations invoked.
    pub provider_calls: AtomicU64,
    /// Provider operations that declined with "not supported".
    pub provider_not_supported: AtomicU64,
    /// Provider operations that failed or timed out.
    pub provider_failures: AtomicU64,
    /// Observations appended to the store.
    pub observations_stored: AtomicU64,
}

impl FxMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_called(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_declined(&self) {
        self.provider_not_supported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_failed(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observation_stored(&self) {
        self.observations_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot.
    pub fn snapshot(&self) -> FxEngineStats {
        FxEngineStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_not_supported: self.provider_not_supported.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            observations_stored: self.observations_stored.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FxEngineStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_calls: u64,
    pub provider_not_supported: u64,
    pub provider_failures: u64,
    pub observations_stored: u64,
}

impl FxEngineStats {
    /// Share of requests answered from the store, 0.0 when idle.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = FxMetrics::new();
        metrics.cache_hit();
        metrics.cache_hit();
        metrics.cache_hit();
        metrics.cache_miss();
        metrics.provider_called();
        metrics.provider_failed();

        let stats = metrics.snapshot();
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.provider_failures, 1);
        assert_eq!(stats.hit_ratio(), 0.75);
        assert_eq!(FxEngineStats::default().hit_ratio(), 0.0);
    }
}
