//! Spot-rate FX Engine
//!
//! Caches and aggregates foreign-exchange spot rates fetched from pluggable
//! remote providers.
//!
//! # Features
//!
//! - Freshness-window lookups against an append-only rate history
//! - Sequential provider fallback with per-provider failure isolation
//! - Aggregation across providers: highest, lowest, newest, oldest, average
//! - PostgreSQL and in-memory rate stores
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spotrate_fx::{AggregationPolicy, FxEngine, FxEngineConfig, MemoryRateStore,
//!     ProviderRegistry, SpotRateRequest};
//!
//! let registry = ProviderRegistry::builder().register(Arc::new(MyBank::new())).build();
//! let engine = FxEngine::new(
//!     Arc::new(MemoryRateStore::new()),
//!     Arc::new(registry),
//!     FxEngineConfig::default(),
//! );
//!
//! let rate = engine
//!     .get_spot_rate(SpotRateRequest::new("USD", "IDR").with_source(AggregationPolicy::Highest))
//!     .await?;
//! ```

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod metrics;
pub mod observation;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod request;
pub mod store;

pub use aggregate::aggregate;
pub use config::FxEngineConfig;
pub use engine::FxEngine;
pub use error::{FxError, FxResult, SourceError, SourceResult};
pub use lookup::FreshnessLookup;
pub use metrics::FxEngineStats;
pub use observation::{CachedRatePair, CollectionKey, RateObservation, RateOrigin, RateQuote};
pub use orchestrator::ProviderOrchestrator;
pub use policy::AggregationPolicy;
pub use provider::{ProviderRegistry, RateSource};
pub use request::{AllRatesRequest, SpotRateRequest};
pub use store::{MemoryRateStore, PgRateStore, PgStoreConfig, RateFilter, RateStore};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
