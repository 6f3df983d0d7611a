//! Requests accepted by the engine.

use chrono::Duration;
use spotrate_common::{Currency, CurrencyPair, RateType};

use crate::error::{FxError, FxResult};
use crate::policy::AggregationPolicy;

/// Request for one currency pair.
#[derive(Debug, Clone, Default)]
pub struct SpotRateRequest {
    pub from: Option<Currency>,
    pub to: Option<Currency>,
    /// Falls back to the engine's default rate type.
    pub rate_type: Option<RateType>,
    pub source: AggregationPolicy,
    /// Falls back to the engine's freshness window.
    pub max_age_cache: Option<Duration>,
}

impl SpotRateRequest {
    /// Create a request for `from` → `to` from any source.
    pub fn new(from: impl Into<Currency>, to: impl Into<Currency>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
            ..Default::default()
        }
    }

    pub fn with_rate_type(mut self, rate_type: impl Into<RateType>) -> Self {
        self.rate_type = Some(rate_type.into());
        self
    }

    pub fn with_source(mut self, source: AggregationPolicy) -> Self {
        self.source = source;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_cache = Some(max_age);
        self
    }

    /// The requested pair; missing or empty currencies are a request error.
    pub fn pair(&self) -> FxResult<CurrencyPair> {
        let from = self
            .from
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FxError::Request("from currency not specified".to_string()))?;
        let to = self
            .to
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FxError::Request("to currency not specified".to_string()))?;
        Ok(CurrencyPair::new(from, to))
    }
}

/// Request for every rate a source (or set of sources) publishes.
#[derive(Debug, Clone, Default)]
pub struct AllRatesRequest {
    /// Required.
    pub source: Option<AggregationPolicy>,
    /// Falls back to the engine's freshness window.
    pub max_age_cache: Option<Duration>,
}

impl AllRatesRequest {
    pub fn new(source: AggregationPolicy) -> Self {
        Self {
            source: Some(source),
            max_age_cache: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_cache = Some(max_age);
        self
    }
}

/// Resolve an optional freshness window against the default.
pub(crate) fn effective_max_age(requested: Option<Duration>, default: Duration) -> FxResult<Duration> {
    let max_age = requested.unwrap_or(default);
    if max_age < Duration::zero() {
        return Err(FxError::Request(format!(
            "max_age_cache must not be negative, got {}s",
            max_age.num_seconds()
        )));
    }
    Ok(max_age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_requires_both_currencies() {
        assert!(SpotRateRequest::new("USD", "IDR").pair().is_ok());

        let missing_to = SpotRateRequest {
            from: Some(Currency::new("USD")),
            ..Default::default()
        };
        assert!(matches!(missing_to.pair(), Err(FxError::Request(_))));

        assert!(matches!(SpotRateRequest::new("", "IDR").pair(), Err(FxError::Request(_))));
    }

    #[test]
    fn test_effective_max_age() {
        let default = Duration::hours(4);
        assert_eq!(effective_max_age(None, default).unwrap(), default);
        assert_eq!(
            effective_max_age(Some(Duration::minutes(5)), default).unwrap(),
            Duration::minutes(5)
        );
        assert!(effective_max_age(Some(Duration::seconds(-5)), default).is_err());
    }
}
