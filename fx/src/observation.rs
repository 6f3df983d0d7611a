//! Rate observations and the read-model returned to callers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spotrate_common::{now, Currency, CurrencyPair, RateType, Timestamp};
use std::fmt;
use std::str::FromStr;

use crate::error::{FxError, FxResult};

/// Which request shape produced a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKey {
    /// Row written by a single-pair lookup.
    SinglePair,
    /// Row belonging to a full rate-table snapshot.
    FullTable,
}

impl CollectionKey {
    /// Persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::SinglePair => "spot",
            CollectionKey::FullTable => "all",
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKey {
    type Err = FxError;

    fn from_str(s: &str) -> FxResult<Self> {
        match s {
            "spot" => Ok(CollectionKey::SinglePair),
            "all" => Ok(CollectionKey::FullTable),
            other => Err(FxError::InvalidObservation(format!(
                "unknown collection key {other:?}"
            ))),
        }
    }
}

/// A quote as handed back by a provider, before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub pair: CurrencyPair,
    pub rate_type: RateType,
    pub rate: Decimal,
    /// When the provider says the rate was last updated.
    pub source_mtime: Option<Timestamp>,
    pub note: Option<String>,
}

impl RateQuote {
    /// Create a quote without mtime or note.
    pub fn new(pair: CurrencyPair, rate_type: RateType, rate: Decimal) -> Self {
        Self {
            pair,
            rate_type,
            rate,
            source_mtime: None,
            note: None,
        }
    }

    /// Attach the provider-reported update time.
    pub fn with_mtime(mut self, mtime: Timestamp) -> Self {
        self.source_mtime = Some(mtime);
        self
    }

    /// Attach a derivation note such as `1/buy_er`.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A single stored quote for a currency pair at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateObservation {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate_type: RateType,
    pub rate: Decimal,
    /// Provider identifier. `None` marks a synthetic value (averages, identity).
    pub source: Option<String>,
    pub note: Option<String>,
    /// When the row was fetched and inserted.
    pub query_time: Timestamp,
    pub source_mtime: Option<Timestamp>,
    pub collection_key: CollectionKey,
}

impl RateObservation {
    /// Stamp a provider quote for storage.
    pub fn from_quote(quote: RateQuote, source: &str, collection_key: CollectionKey) -> Self {
        Self {
            from_currency: quote.pair.from,
            to_currency: quote.pair.to,
            rate_type: quote.rate_type,
            rate: quote.rate,
            source: Some(source.to_string()),
            note: quote.note,
            query_time: now(),
            source_mtime: quote.source_mtime,
            collection_key,
        }
    }

    /// Rate 1 for converting a currency into itself.
    pub fn identity(currency: Currency, rate_type: RateType) -> Self {
        let ts = now();
        Self {
            from_currency: currency.clone(),
            to_currency: currency,
            rate_type,
            rate: Decimal::ONE,
            source: None,
            note: None,
            query_time: ts,
            source_mtime: Some(ts),
            collection_key: CollectionKey::SinglePair,
        }
    }

    /// Get the currency pair.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.from_currency.clone(), self.to_currency.clone())
    }

    /// Whether this row answers a request for `pair` / `rate_type`.
    pub fn matches(&self, pair: &CurrencyPair, rate_type: &RateType) -> bool {
        self.from_currency == pair.from && self.to_currency == pair.to && &self.rate_type == rate_type
    }

    /// Source identifier, or empty for synthetic rows.
    pub fn source_str(&self) -> &str {
        self.source.as_deref().unwrap_or("")
    }

    /// Check the invariants a stored row must satisfy.
    pub fn validate(&self) -> FxResult<()> {
        if self.rate <= Decimal::ZERO {
            return Err(FxError::InvalidObservation(format!(
                "rate must be positive, got {}",
                self.rate
            )));
        }
        if self.from_currency == self.to_currency {
            return Err(FxError::InvalidObservation(format!(
                "identity pair {} is never stored",
                self.pair()
            )));
        }
        match self.source.as_deref() {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err(FxError::InvalidObservation(
                "stored rows need a source".to_string(),
            )),
        }
    }
}

/// Where a returned rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    /// `from == to`, answered without touching the store.
    Identity,
    /// Served from the rate store inside the freshness window.
    Cache,
    /// Freshly fetched from providers during this call.
    Fresh,
}

/// A rate returned to the caller, annotated with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRatePair {
    pub observation: RateObservation,
    pub origin: RateOrigin,
}

impl CachedRatePair {
    pub fn new(observation: RateObservation, origin: RateOrigin) -> Self {
        Self {
            observation,
            origin,
        }
    }

    /// Get the rate.
    pub fn rate(&self) -> Decimal {
        self.observation.rate
    }

    pub fn is_cached(&self) -> bool {
        self.origin == RateOrigin::Cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(rate: Decimal) -> RateQuote {
        RateQuote::new(CurrencyPair::new("USD", "IDR"), RateType::sell(), rate)
    }

    #[test]
    fn test_from_quote_stamps_source_and_key() {
        let obs = RateObservation::from_quote(
            quote(dec!(15500.12345678)).with_note("1/buy_er"),
            "bca",
            CollectionKey::FullTable,
        );

        assert_eq!(obs.source.as_deref(), Some("bca"));
        assert_eq!(obs.collection_key, CollectionKey::FullTable);
        assert_eq!(obs.note.as_deref(), Some("1/buy_er"));
        assert_eq!(obs.rate, dec!(15500.12345678));
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_rows() {
        let zero = RateObservation::from_quote(quote(dec!(0)), "bca", CollectionKey::SinglePair);
        assert!(matches!(zero.validate(), Err(FxError::InvalidObservation(_))));

        let identity = RateObservation::identity(Currency::new("USD"), RateType::sell());
        assert!(identity.validate().is_err());

        let mut unsourced =
            RateObservation::from_quote(quote(dec!(1.5)), "bca", CollectionKey::SinglePair);
        unsourced.source = None;
        assert!(unsourced.validate().is_err());
    }

    #[test]
    fn test_collection_key_round_trip() {
        for key in [CollectionKey::SinglePair, CollectionKey::FullTable] {
            assert_eq!(key.as_str().parse::<CollectionKey>().unwrap(), key);
        }
        assert!("other".parse::<CollectionKey>().is_err());
    }
}
