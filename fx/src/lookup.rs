//! Cache hit/miss decisions against the rate store.

use chrono::Duration;
use spotrate_common::{CurrencyPair, RateType};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::observation::{CollectionKey, RateObservation};
use crate::policy::AggregationPolicy;
use crate::store::{RateFilter, RateStore};

/// Answers requests from stored observations without contacting providers.
///
/// An empty result is a miss.
pub struct FreshnessLookup<'a> {
    store: &'a dyn RateStore,
}

impl<'a> FreshnessLookup<'a> {
    pub fn new(store: &'a dyn RateStore) -> Self {
        Self { store }
    }

    /// Stored rows that satisfy a single-pair request.
    pub async fn spot(
        &self,
        pair: &CurrencyPair,
        rate_type: &RateType,
        policy: &AggregationPolicy,
        max_age: Duration,
    ) -> FxResult<Vec<RateObservation>> {
        let filter = RateFilter::pair(pair, rate_type);

        let rows = match policy {
            AggregationPolicy::AllSources => {
                return Err(FxError::Request(
                    "all sources cannot answer a single-pair spot rate".to_string(),
                ))
            }
            AggregationPolicy::SpecificSource(source) => {
                self.store
                    .query_recent(&filter.with_source(source.clone()), max_age, Some(1))
                    .await?
            }
            AggregationPolicy::AnySource => {
                self.store.query_recent(&filter, max_age, Some(1)).await?
            }
            _ => {
                let sources = self.store.distinct_sources(&filter, max_age).await?;
                let mut latest = Vec::with_capacity(sources.len());
                for source in sources {
                    let rows = self
                        .store
                        .query_recent(&filter.clone().with_source(source), max_age, Some(1))
                        .await?;
                    latest.extend(rows);
                }
                latest
            }
        };

        debug!(pair = %pair, rate_type = %rate_type, policy = %policy, hits = rows.len(), "Spot lookup");
        Ok(rows)
    }

    /// Stored full-table snapshot rows that satisfy an all-rates request.
    pub async fn all(
        &self,
        policy: &AggregationPolicy,
        max_age: Duration,
    ) -> FxResult<Vec<RateObservation>> {
        let mut filter = RateFilter::default().with_collection_key(CollectionKey::FullTable);

        match policy {
            AggregationPolicy::SpecificSource(source) => {
                filter = filter.with_source(source.clone());
            }
            AggregationPolicy::AnySource => {
                // Serve the provider holding the newest snapshot row.
                let newest = self.store.query_recent(&filter, max_age, Some(1)).await?;
                match newest.into_iter().next().and_then(|r| r.source) {
                    Some(source) => filter = filter.with_source(source),
                    None => return Ok(Vec::new()),
                }
            }
            _ => {}
        }

        let rows = self.store.query_recent(&filter, max_age, None).await?;
        let rows = dedup_latest(rows);

        debug!(policy = %policy, hits = rows.len(), "All-rates lookup");
        Ok(rows)
    }
}

/// Keep the first row per `(source, pair, rate_type)`; input is newest first.
fn dedup_latest(rows: Vec<RateObservation>) -> Vec<RateObservation> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| {
            seen.insert((
                r.source.clone(),
                r.from_currency.clone(),
                r.to_currency.clone(),
                r.rate_type.clone(),
            ))
        })
        .collect()
}
