//! In-process rate store.

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use super::{normalize_rate, RateFilter, RateStore};
use crate::error::{FxError, FxResult};
use crate::observation::RateObservation;
use spotrate_common::window_start;

/// Append-only observation history held in memory.
pub struct MemoryRateStore {
    rows: RwLock<Vec<RateObservation>>,
    available: AtomicBool,
    rate_scale: Option<u32>,
}

impl MemoryRateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            rate_scale: None,
        }
    }

    /// Keep only `scale` fractional digits of each rate, like a `NUMERIC` column.
    pub fn with_rate_scale(mut self, scale: u32) -> Self {
        self.rate_scale = Some(scale);
        self
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of every row in insertion order.
    pub fn snapshot(&self) -> Vec<RateObservation> {
        self.rows.read().clone()
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> FxResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FxError::StorageUnavailable("memory store offline".to_string()))
        }
    }

    fn matching(&self, filter: &RateFilter, max_age: Duration) -> Vec<RateObservation> {
        let cutoff = window_start(max_age);
        let mut rows: Vec<RateObservation> = self
            .rows
            .read()
            .iter()
            .rev()
            .filter(|r| r.query_time >= cutoff && filter.matches(r))
            .cloned()
            .collect();
        // Stable: equal query_time keeps the later insert first.
        rows.sort_by(|a, b| b.query_time.cmp(&a.query_time));
        rows
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn insert(&self, observation: &RateObservation) -> FxResult<()> {
        self.check_available()?;
        observation.validate()?;
        let mut row = observation.clone();
        if let Some(scale) = self.rate_scale {
            row.rate = normalize_rate(row.rate, scale);
        }
        self.rows.write().push(row);
        trace!(
            source = observation.source_str(),
            pair = %observation.pair(),
            rate = %observation.rate,
            "Stored observation"
        );
        Ok(())
    }

    async fn query_recent(
        &self,
        filter: &RateFilter,
        max_age: Duration,
        limit: Option<usize>,
    ) -> FxResult<Vec<RateObservation>> {
        self.check_available()?;
        let mut rows = self.matching(filter, max_age);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn distinct_sources(
        &self,
        filter: &RateFilter,
        max_age: Duration,
    ) -> FxResult<Vec<String>> {
        self.check_available()?;
        let sources: BTreeSet<String> = self
            .matching(filter, max_age)
            .into_iter()
            .filter_map(|r| r.source)
            .collect();
        Ok(sources.into_iter().collect())
    }

    fn rate_scale(&self) -> Option<u32> {
        self.rate_scale
    }
}
