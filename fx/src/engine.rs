//! Main FX engine implementation.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::aggregate::aggregate;
use crate::config::FxEngineConfig;
use crate::error::{FxError, FxResult};
use crate::lookup::FreshnessLookup;
use crate::metrics::{FxEngineStats, FxMetrics};
use crate::observation::{CachedRatePair, RateObservation, RateOrigin};
use crate::orchestrator::ProviderOrchestrator;
use crate::policy::AggregationPolicy;
use crate::provider::ProviderRegistry;
use crate::request::{effective_max_age, AllRatesRequest, SpotRateRequest};
use crate::store::RateStore;

/// The main FX engine: cache lookup, provider fallback and aggregation.
pub struct FxEngine {
    store: Arc<dyn RateStore>,
    registry: Arc<ProviderRegistry>,
    metrics: FxMetrics,
    config: FxEngineConfig,
}

impl FxEngine {
    /// Create a new FX engine over a store and a provider registry.
    pub fn new(
        store: Arc<dyn RateStore>,
        registry: Arc<ProviderRegistry>,
        config: FxEngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            metrics: FxMetrics::new(),
            config,
        }
    }

    /// Get the current rate for one currency pair.
    #[instrument(skip(self, request), fields(from = ?request.from, to = ?request.to, source = %request.source))]
    pub async fn get_spot_rate(&self, request: SpotRateRequest) -> FxResult<CachedRatePair> {
        let pair = request.pair()?;
        let rate_type = request
            .rate_type
            .clone()
            .unwrap_or_else(|| self.config.default_rate_type.clone());

        if pair.is_identity() {
            debug!(pair = %pair, "Identity conversion");
            return Ok(CachedRatePair::new(
                RateObservation::identity(pair.from, rate_type),
                RateOrigin::Identity,
            ));
        }

        if request.source == AggregationPolicy::AllSources {
            return Err(FxError::Request(
                "all sources cannot answer a single-pair spot rate".to_string(),
            ));
        }
        let max_age = effective_max_age(request.max_age_cache, self.config.max_age_cache)?;

        let cached = FreshnessLookup::new(self.store.as_ref())
            .spot(&pair, &rate_type, &request.source, max_age)
            .await?;

        let (rows, origin) = if cached.is_empty() {
            self.metrics.cache_miss();
            let fresh = self
                .orchestrator()
                .fetch_spot(&pair, &rate_type, &request.source)
                .await?;
            (fresh, RateOrigin::Fresh)
        } else {
            self.metrics.cache_hit();
            debug!(pair = %pair, rows = cached.len(), "Using cached rate");
            (cached, RateOrigin::Cache)
        };

        let observation = aggregate(rows, &request.source)?
            .into_iter()
            .next()
            .ok_or(FxError::NoRatesFound)?;

        info!(
            pair = %pair,
            rate = %observation.rate,
            source = observation.source_str(),
            origin = ?origin,
            "Resolved spot rate"
        );
        Ok(CachedRatePair::new(observation, origin))
    }

    /// Get every spot rate published by the requested source(s).
    #[instrument(skip(self, request), fields(source = ?request.source))]
    pub async fn get_all_spot_rates(
        &self,
        request: AllRatesRequest,
    ) -> FxResult<Vec<CachedRatePair>> {
        let policy = request
            .source
            .ok_or_else(|| FxError::Request("source not specified".to_string()))?;
        let max_age = effective_max_age(request.max_age_cache, self.config.max_age_cache)?;

        let cached = FreshnessLookup::new(self.store.as_ref())
            .all(&policy, max_age)
            .await?;

        let (rows, origin) = if cached.is_empty() {
            self.metrics.cache_miss();
            (self.orchestrator().fetch_all(&policy).await?, RateOrigin::Fresh)
        } else {
            self.metrics.cache_hit();
            (cached, RateOrigin::Cache)
        };

        let rates: Vec<CachedRatePair> = aggregate(rows, &policy)?
            .into_iter()
            .map(|o| CachedRatePair::new(o, origin))
            .collect();

        info!(policy = %policy, rates = rates.len(), origin = ?origin, "Resolved all spot rates");
        Ok(rates)
    }

    /// Get engine statistics.
    pub fn stats(&self) -> FxEngineStats {
        self.metrics.snapshot()
    }

    /// Engine configuration.
    pub fn config(&self) -> &FxEngineConfig {
        &self.config
    }

    /// Providers known to the engine, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.registry.list_providers()
    }

    fn orchestrator(&self) -> ProviderOrchestrator<'_> {
        ProviderOrchestrator::new(self.store.as_ref(), &self.registry, &self.metrics)
            .with_timeout(self.config.provider_timeout)
    }
}
