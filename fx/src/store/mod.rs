//! Durable, append-only history of rate observations.

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::{Decimal, RoundingStrategy};
use spotrate_common::{Currency, CurrencyPair, RateType};

use crate::error::FxResult;
use crate::observation::{CollectionKey, RateObservation};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRateStore;
pub use postgres::{PgRateStore, PgStoreConfig};

/// Exact-match filter; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateFilter {
    pub source: Option<String>,
    pub from_currency: Option<Currency>,
    pub to_currency: Option<Currency>,
    pub rate_type: Option<RateType>,
    pub collection_key: Option<CollectionKey>,
}

impl RateFilter {
    /// Filter on a single pair and rate type.
    pub fn pair(pair: &CurrencyPair, rate_type: &RateType) -> Self {
        Self {
            from_currency: Some(pair.from.clone()),
            to_currency: Some(pair.to.clone()),
            rate_type: Some(rate_type.clone()),
            ..Default::default()
        }
    }

    /// Restrict to one provider.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Restrict to rows produced by one request shape.
    pub fn with_collection_key(mut self, key: CollectionKey) -> Self {
        self.collection_key = Some(key);
        self
    }

    /// Whether `obs` passes this filter (ignores the time window).
    pub fn matches(&self, obs: &RateObservation) -> bool {
        self.source
            .as_deref()
            .map_or(true, |s| obs.source.as_deref() == Some(s))
            && self
                .from_currency
                .as_ref()
                .map_or(true, |c| &obs.from_currency == c)
            && self.to_currency.as_ref().map_or(true, |c| &obs.to_currency == c)
            && self.rate_type.as_ref().map_or(true, |t| &obs.rate_type == t)
            && self
                .collection_key
                .map_or(true, |k| obs.collection_key == k)
    }
}

/// Storage backend for observations.
///
/// Rows are only ever appended. Implementations must tolerate concurrent
/// inserts from independent requests without any lock held by the caller.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Append one observation. Durable once this returns `Ok`.
    async fn insert(&self, observation: &RateObservation) -> FxResult<()>;

    /// Rows matching `filter` with `query_time >= now - max_age`, newest first.
    async fn query_recent(
        &self,
        filter: &RateFilter,
        max_age: Duration,
        limit: Option<usize>,
    ) -> FxResult<Vec<RateObservation>>;

    /// Sorted providers with at least one matching row inside the window.
    async fn distinct_sources(&self, filter: &RateFilter, max_age: Duration)
        -> FxResult<Vec<String>>;

    /// Fractional digits kept for `rate`, when the backend has a fixed scale.
    ///
    /// Writers normalize rates with [`normalize_rate`] first so a value read
    /// back equals the value that was written.
    fn rate_scale(&self) -> Option<u32> {
        None
    }
}

/// Round `rate` to `scale` digits the way a SQL `NUMERIC` column does
/// (half away from zero) and pad it to exactly that scale.
pub fn normalize_rate(rate: Decimal, scale: u32) -> Decimal {
    let mut rate = rate.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rate.rescale(scale);
    rate
}
