//! Rate provider trait and the provider registry.

use async_trait::async_trait;
use spotrate_common::{CurrencyPair, RateType, Timestamp};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::error::{FxError, FxResult, SourceError, SourceResult};
use crate::observation::RateQuote;

/// A remote rate source (bank, money changer, ...).
///
/// Every operation is optional: the defaults answer
/// [`SourceError::NotSupported`], which callers treat as "try the next
/// provider" rather than as a failure.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Provider identifier, unique within a registry.
    fn name(&self) -> &str;

    /// Current rate for one pair.
    async fn get_spot_rate(
        &self,
        _pair: &CurrencyPair,
        _rate_type: &RateType,
    ) -> SourceResult<RateQuote> {
        Err(SourceError::NotSupported)
    }

    /// Every rate the provider publishes.
    async fn get_all_spot_rates(&self) -> SourceResult<Vec<RateQuote>> {
        Err(SourceError::NotSupported)
    }

    /// Rate for one pair as of a past instant.
    async fn get_historical_rate(
        &self,
        _pair: &CurrencyPair,
        _rate_type: &RateType,
        _as_of: Timestamp,
    ) -> SourceResult<RateQuote> {
        Err(SourceError::NotSupported)
    }
}

/// Immutable set of known providers, keyed and ordered by identifier.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn RateSource>>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<ProviderRegistry>> = OnceLock::new();

impl ProviderRegistry {
    /// Start building a registry.
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// A registry with no providers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All provider identifiers, sorted.
    pub fn list_providers(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Look up a provider by identifier.
    pub fn resolve(&self, id: &str) -> FxResult<Arc<dyn RateSource>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| FxError::UnknownProvider(id.to_string()))
    }

    /// Every provider in identifier order.
    pub fn all(&self) -> Vec<Arc<dyn RateSource>> {
        self.providers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Install the process-wide registry. Only the first call wins.
    pub fn install_global(registry: ProviderRegistry) -> FxResult<Arc<ProviderRegistry>> {
        let registry = Arc::new(registry);
        GLOBAL_REGISTRY
            .set(registry.clone())
            .map_err(|_| FxError::Request("provider registry already installed".to_string()))?;
        info!(providers = ?registry.list_providers(), "Installed provider registry");
        Ok(registry)
    }

    /// The process-wide registry, if installed.
    pub fn global() -> Option<Arc<ProviderRegistry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}

/// Collects providers before freezing them into a [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: BTreeMap<String, Arc<dyn RateSource>>,
}

impl ProviderRegistryBuilder {
    /// Add a provider. A later provider with the same name replaces an earlier one.
    pub fn register(mut self, provider: Arc<dyn RateSource>) -> Self {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            debug!(provider = %name, "Replaced provider with duplicate name");
        }
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

/// Scripted provider for tests, with call counters.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    spot: dashmap::DashMap<(CurrencyPair, RateType), RateQuote>,
    table: parking_lot::RwLock<Option<Vec<RateQuote>>>,
    failure: parking_lot::RwLock<Option<String>>,
    spot_supported: std::sync::atomic::AtomicBool,
    spot_calls: std::sync::atomic::AtomicUsize,
    table_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a provider that answers nothing until rates are set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spot: dashmap::DashMap::new(),
            table: parking_lot::RwLock::new(None),
            failure: parking_lot::RwLock::new(None),
            spot_supported: std::sync::atomic::AtomicBool::new(true),
            spot_calls: std::sync::atomic::AtomicUsize::new(0),
            table_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Answer `get_spot_rate` for the quote's pair and type.
    pub fn set_rate(&self, quote: RateQuote) {
        self.spot
            .insert((quote.pair.clone(), quote.rate_type.clone()), quote);
    }

    /// Answer `get_all_spot_rates` with this table.
    pub fn set_table(&self, quotes: Vec<RateQuote>) {
        *self.table.write() = Some(quotes);
    }

    /// Make every call fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.write() = Some(reason.into());
    }

    /// Make `get_spot_rate` answer `NotSupported`.
    pub fn without_spot_rate(self) -> Self {
        self.spot_supported
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self
    }

    pub fn spot_calls(&self) -> usize {
        self.spot_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn table_calls(&self) -> usize {
        self.table_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Total calls across both spot operations.
    pub fn calls(&self) -> usize {
        self.spot_calls() + self.table_calls()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_spot_rate(
        &self,
        pair: &CurrencyPair,
        rate_type: &RateType,
    ) -> SourceResult<RateQuote> {
        self.spot_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.spot_supported.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SourceError::NotSupported);
        }
        if let Some(reason) = self.failure.read().clone() {
            return Err(SourceError::Failure(reason));
        }
        self.spot
            .get(&(pair.clone(), rate_type.clone()))
            .map(|q| q.clone())
            .ok_or_else(|| SourceError::Failure(format!("no {rate_type} rate for {pair}")))
    }

    async fn get_all_spot_rates(&self) -> SourceResult<Vec<RateQuote>> {
        self.table_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(reason) = self.failure.read().clone() {
            return Err(SourceError::Failure(reason));
        }
        self.table.read().clone().ok_or(SourceError::NotSupported)
    }
}
