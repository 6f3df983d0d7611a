//! Currency codes, currency pairs and rate-type tags.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Process-wide table of interned currency codes. Entries live for the
/// rest of the process.
fn interner() -> &'static DashMap<Arc<str>, ()> {
    static INTERNER: OnceLock<DashMap<Arc<str>, ()>> = OnceLock::new();
    INTERNER.get_or_init(DashMap::new)
}

fn intern(code: &str) -> Arc<str> {
    let table = interner();
    if let Some(entry) = table.get(code) {
        return entry.key().clone();
    }
    table.entry(Arc::from(code)).or_insert(()).key().clone()
}

/// Currency code.
///
/// Codes are opaque: no ISO 4217 validation and no case folding. Surrounding
/// whitespace is trimmed and the text is interned, so every `Currency` for the
/// same code shares one allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(Arc<str>);

impl Currency {
    /// Create (or look up) the interned currency for `code`.
    ///
    /// Interned codes are never released, so the table grows with every
    /// distinct code seen. Bound or validate codes taken from untrusted input
    /// before building a `Currency` from them.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(intern(code.as_ref().trim()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// An empty code stands for "not given".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both values point at the same interned allocation.
    pub fn same_allocation(&self, other: &Currency) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.0)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0.to_string()
    }
}

/// A directed currency pair: how many `to` units one `from` unit buys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being converted from.
    pub from: Currency,
    /// Currency being converted to.
    pub to: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(from: impl Into<Currency>, to: impl Into<Currency>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Converting a currency into itself.
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// Free-form rate tag such as `sell` or `buy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateType(String);

impl RateType {
    /// Rate type used when a request does not name one.
    pub const DEFAULT: &'static str = "sell";

    /// Create a new rate type tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn sell() -> Self {
        Self::new("sell")
    }

    pub fn buy() -> Self {
        Self::new("buy")
    }

    /// Get the tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RateType {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RateType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_is_interned() {
        let a = Currency::new("IDR");
        let b = Currency::new(String::from(" IDR "));

        assert_eq!(a, b);
        assert!(a.same_allocation(&b));
        assert_eq!(a.code(), "IDR");
    }

    #[test]
    fn test_currency_is_opaque() {
        // No case folding: codes are compared as given.
        assert_ne!(Currency::new("usd"), Currency::new("USD"));
        assert!(Currency::new("  ").is_empty());
    }

    #[test]
    fn test_currency_serde() {
        let c = Currency::new("USD");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"USD\"");

        let back: Currency = serde_json::from_str(&json).unwrap();
        assert!(back.same_allocation(&c));
    }

    #[test]
    fn test_pair() {
        let pair = CurrencyPair::new("USD", "IDR");
        assert_eq!(pair.to_string(), "USD/IDR");
        assert!(!pair.is_identity());
        assert_eq!(pair.inverse(), CurrencyPair::new("IDR", "USD"));
        assert!(CurrencyPair::new("IDR", "IDR").is_identity());
    }

    #[test]
    fn test_rate_type_default() {
        assert_eq!(RateType::default(), RateType::sell());
        assert_eq!(RateType::from("buy").as_str(), "buy");
    }
}
