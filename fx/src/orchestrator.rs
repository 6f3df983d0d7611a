//! Querying providers on a cache miss.

use spotrate_common::{now, CurrencyPair, RateType, Timestamp};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FxError, FxResult, SourceError, SourceResult};
use crate::metrics::FxMetrics;
use crate::observation::{CollectionKey, RateObservation, RateQuote};
use crate::policy::AggregationPolicy;
use crate::provider::{ProviderRegistry, RateSource};
use crate::store::{normalize_rate, RateStore};

/// Calls providers one after another, persisting everything they return.
pub struct ProviderOrchestrator<'a> {
    store: &'a dyn RateStore,
    registry: &'a ProviderRegistry,
    metrics: &'a FxMetrics,
    timeout: Option<std::time::Duration>,
}

impl<'a> ProviderOrchestrator<'a> {
    pub fn new(
        store: &'a dyn RateStore,
        registry: &'a ProviderRegistry,
        metrics: &'a FxMetrics,
    ) -> Self {
        Self {
            store,
            registry,
            metrics,
            timeout: None,
        }
    }

    /// Bound every provider call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Providers to try for `policy`, in call order.
    pub fn candidates(&self, policy: &AggregationPolicy) -> FxResult<Vec<Arc<dyn RateSource>>> {
        if self.registry.is_empty() {
            return Err(FxError::NoProvidersAvailable);
        }
        match policy.specific_source() {
            Some(name) => Ok(vec![self.registry.resolve(name)?]),
            None => Ok(self.registry.all()),
        }
    }

    /// Fetch one pair. Returned rows are filtered to `pair` / `rate_type`.
    pub async fn fetch_spot(
        &self,
        pair: &CurrencyPair,
        rate_type: &RateType,
        policy: &AggregationPolicy,
    ) -> FxResult<Vec<RateObservation>> {
        let mut results = Vec::new();

        for provider in self.candidates(policy)? {
            let name = provider.name();
            let fetched_at = now();

            let stored = match self.call(name, provider.get_spot_rate(pair, rate_type)).await {
                Ok(quote) => {
                    self.persist(name, vec![quote], CollectionKey::SinglePair, fetched_at)
                        .await?
                }
                Err(SourceError::NotSupported) => {
                    // Providers that only publish a full table still answer single pairs.
                    match self.call(name, provider.get_all_spot_rates()).await {
                        Ok(quotes) => {
                            self.persist(name, quotes, CollectionKey::FullTable, fetched_at)
                                .await?
                        }
                        Err(_) => continue,
                    }
                }
                Err(SourceError::Failure(_)) => continue,
            };

            results.extend(stored.into_iter().filter(|o| o.matches(pair, rate_type)));

            if policy.stops_on_first() && !results.is_empty() {
                debug!(provider = name, pair = %pair, "Got rate, not asking further providers");
                break;
            }
        }

        info!(pair = %pair, rate_type = %rate_type, policy = %policy, rows = results.len(), "Fetched spot rate");
        Ok(results)
    }

    /// Fetch full rate tables.
    pub async fn fetch_all(&self, policy: &AggregationPolicy) -> FxResult<Vec<RateObservation>> {
        let mut results = Vec::new();

        for provider in self.candidates(policy)? {
            let name = provider.name();
            let fetched_at = now();

            let quotes = match self.call(name, provider.get_all_spot_rates()).await {
                Ok(quotes) => quotes,
                Err(_) => continue,
            };
            results.extend(
                self.persist(name, quotes, CollectionKey::FullTable, fetched_at)
                    .await?,
            );

            if policy.stops_on_first() && !results.is_empty() {
                break;
            }
        }

        info!(policy = %policy, rows = results.len(), "Fetched all spot rates");
        Ok(results)
    }

    /// Run one provider operation, logging and counting its outcome.
    async fn call<T, F>(&self, provider: &str, op: F) -> SourceResult<T>
    where
        F: Future<Output = SourceResult<T>>,
    {
        self.metrics.provider_called();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, op).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SourceError::Failure(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => op.await,
        };

        match &outcome {
            Ok(_) => {}
            Err(SourceError::NotSupported) => {
                self.metrics.provider_declined();
                debug!(provider = provider, "Operation not supported by provider");
            }
            Err(SourceError::Failure(reason)) => {
                self.metrics.provider_failed();
                warn!(provider = provider, error = %reason, "Provider failed to return rates");
            }
        }
        outcome
    }

    /// Stamp and store quotes. Rates are cut to the store's scale before
    /// validation. Invalid quotes are dropped; store errors are fatal.
    async fn persist(
        &self,
        provider: &str,
        quotes: Vec<RateQuote>,
        key: CollectionKey,
        fetched_at: Timestamp,
    ) -> FxResult<Vec<RateObservation>> {
        let mut stored = Vec::with_capacity(quotes.len());

        for quote in quotes {
            let mut observation = RateObservation::from_quote(quote, provider, key);
            observation.query_time = fetched_at;
            if let Some(scale) = self.store.rate_scale() {
                observation.rate = normalize_rate(observation.rate, scale);
            }

            if let Err(e) = observation.validate() {
                warn!(provider = provider, pair = %observation.pair(), error = %e, "Dropping invalid quote");
                continue;
            }

            self.store.insert(&observation).await?;
            self.metrics.observation_stored();
            stored.push(observation);
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockRateSource;
    use crate::store::{MemoryRateStore, RateFilter};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn usd_idr() -> CurrencyPair {
        CurrencyPair::new("USD", "IDR")
    }

    fn quote(pair: &CurrencyPair, rate: Decimal) -> RateQuote {
        RateQuote::new(pair.clone(), RateType::sell(), rate)
    }

    fn provider_with_rate(name: &str, rate: Decimal) -> Arc<MockRateSource> {
        let p = Arc::new(MockRateSource::new(name));
        p.set_rate(quote(&usd_idr(), rate));
        p
    }

    fn registry(providers: &[Arc<MockRateSource>]) -> ProviderRegistry {
        providers
            .iter()
            .fold(ProviderRegistry::builder(), |b, p| b.register(p.clone()))
            .build()
    }

    #[tokio::test]
    async fn test_any_source_stops_after_first_result() {
        let p1 = Arc::new(MockRateSource::new("p1"));
        p1.fail_with("connection reset");
        let p2 = provider_with_rate("p2", dec!(15500));
        let p3 = provider_with_rate("p3", dec!(15600));
        let registry = registry(&[p1.clone(), p2.clone(), p3.clone()]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let rows = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::AnySource)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source.as_deref(), Some("p2"));
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
        assert_eq!(p3.calls(), 0);
        assert_eq!(metrics.snapshot().provider_failures, 1);
    }

    #[tokio::test]
    async fn test_multi_source_asks_everyone_and_persists() {
        let p1 = provider_with_rate("bca", dec!(15500));
        let p2 = provider_with_rate("gmc", dec!(15600));
        let registry = registry(&[p2.clone(), p1.clone()]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let rows = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::Highest)
            .await
            .unwrap();

        let sources: Vec<&str> = rows.iter().map(|r| r.source_str()).collect();
        assert_eq!(sources, vec!["bca", "gmc"]);
        assert_eq!(store.len(), 2);
        assert!(store
            .snapshot()
            .iter()
            .all(|r| r.collection_key == CollectionKey::SinglePair));
    }

    #[tokio::test]
    async fn test_not_supported_falls_back_to_full_table() {
        let p = Arc::new(MockRateSource::new("bca").without_spot_rate());
        p.set_table(vec![
            quote(&usd_idr(), dec!(15500)),
            quote(&CurrencyPair::new("EUR", "IDR"), dec!(16800)),
        ]);
        let registry = registry(&[p.clone()]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let rows = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::AnySource)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rate, dec!(15500));
        // Whole snapshot stored, only the requested pair returned.
        assert_eq!(store.len(), 2);
        assert!(store
            .snapshot()
            .iter()
            .all(|r| r.collection_key == CollectionKey::FullTable));
        assert_eq!(metrics.snapshot().provider_not_supported, 1);
    }

    #[tokio::test]
    async fn test_nothing_supported_yields_empty() {
        let p = Arc::new(MockRateSource::new("bca").without_spot_rate());
        let registry = registry(&[p.clone()]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let rows = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::AnySource)
            .await
            .unwrap();

        assert!(rows.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_fails_before_any_call() {
        let registry = ProviderRegistry::empty();
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let result = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_all(&AggregationPolicy::AllSources)
            .await;

        assert!(matches!(result, Err(FxError::NoProvidersAvailable)));
        assert_eq!(metrics.snapshot().provider_calls, 0);
    }

    #[tokio::test]
    async fn test_unknown_specific_source() {
        let registry = registry(&[provider_with_rate("bca", dec!(1))]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let result = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &"nope".parse().unwrap())
            .await;

        assert!(matches!(result, Err(FxError::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn test_invalid_quotes_are_dropped() {
        let p = Arc::new(MockRateSource::new("bca"));
        p.set_table(vec![
            quote(&usd_idr(), dec!(0)),
            quote(&CurrencyPair::new("IDR", "IDR"), dec!(1)),
            quote(&CurrencyPair::new("EUR", "IDR"), dec!(16800)),
        ]);
        let registry = registry(&[p]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        let rows = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_all(&AggregationPolicy::AllSources)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(metrics.snapshot().observations_stored, 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let registry = registry(&[provider_with_rate("bca", dec!(15500))]);
        let store = MemoryRateStore::new();
        store.set_available(false);
        let metrics = FxMetrics::new();

        let result = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::AnySource)
            .await;

        assert!(matches!(result, Err(FxError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_written_rows_are_readable_bit_exact() {
        let rate = dec!(0.00006451);
        let registry = registry(&[provider_with_rate("bca", rate)]);
        let store = MemoryRateStore::new();
        let metrics = FxMetrics::new();

        ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::AnySource)
            .await
            .unwrap();

        let filter = RateFilter::pair(&usd_idr(), &RateType::sell()).with_source("bca");
        let rows = store.query_recent(&filter, Duration::hours(4), Some(1)).await.unwrap();
        assert_eq!(rows[0].rate, rate);
        assert_eq!(rows[0].rate.to_string(), "0.00006451");
    }

    #[tokio::test]
    async fn test_rates_cut_to_store_scale_before_returning() {
        let registry = registry(&[provider_with_rate("bca", dec!(0.0000645161290322))]);
        let store = MemoryRateStore::new().with_rate_scale(8);
        let metrics = FxMetrics::new();

        let fresh = ProviderOrchestrator::new(&store, &registry, &metrics)
            .fetch_spot(&usd_idr(), &RateType::sell(), &AggregationPolicy::AnySource)
            .await
            .unwrap();

        let filter = RateFilter::pair(&usd_idr(), &RateType::sell()).with_source("bca");
        let rows = store.query_recent(&filter, Duration::hours(4), Some(1)).await.unwrap();
        assert_eq!(fresh[0].rate.to_string(), "0.00006452");
        assert_eq!(rows[0].rate.to_string(), fresh[0].rate.to_string());
    }
}
