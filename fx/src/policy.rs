//! Source selection and aggregation policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FxError;

/// How results from one or more providers are combined into an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// First provider that answers.
    AnySource,
    /// One row per provider.
    AllSources,
    /// Only the named provider.
    SpecificSource(String),
    Highest,
    Lowest,
    /// Latest `source_mtime`.
    Newest,
    /// Earliest `source_mtime`.
    Oldest,
    /// Mean rate and mean `source_mtime` across providers.
    Average,
}

impl AggregationPolicy {
    /// Whether more than one provider contributes to the answer.
    pub fn is_multi_source(&self) -> bool {
        !matches!(
            self,
            AggregationPolicy::AnySource | AggregationPolicy::SpecificSource(_)
        )
    }

    /// Whether orchestration stops at the first provider with a result.
    pub fn stops_on_first(&self) -> bool {
        matches!(self, AggregationPolicy::AnySource)
    }

    /// The named provider, if any.
    pub fn specific_source(&self) -> Option<&str> {
        match self {
            AggregationPolicy::SpecificSource(name) => Some(name),
            _ => None,
        }
    }

    /// Word used in synthetic notes (`highest of a, b`).
    pub fn label(&self) -> &str {
        match self {
            AggregationPolicy::AnySource => "any",
            AggregationPolicy::AllSources => "all",
            AggregationPolicy::SpecificSource(name) => name,
            AggregationPolicy::Highest => "highest",
            AggregationPolicy::Lowest => "lowest",
            AggregationPolicy::Newest => "newest",
            AggregationPolicy::Oldest => "oldest",
            AggregationPolicy::Average => "average",
        }
    }
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        AggregationPolicy::AnySource
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationPolicy::SpecificSource(name) => f.write_str(name),
            other => write!(f, ":{}", other.label()),
        }
    }
}

impl FromStr for AggregationPolicy {
    type Err = FxError;

    /// Parse `:any`, `:all`, `:highest`, `:lowest`, `:newest`, `:oldest`,
    /// `:average`, or a bare provider identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FxError::Request("source not specified".to_string()));
        }
        let policy = match s {
            ":any" => AggregationPolicy::AnySource,
            ":all" => AggregationPolicy::AllSources,
            ":highest" => AggregationPolicy::Highest,
            ":lowest" => AggregationPolicy::Lowest,
            ":newest" => AggregationPolicy::Newest,
            ":oldest" => AggregationPolicy::Oldest,
            ":average" => AggregationPolicy::Average,
            other if other.starts_with(':') => {
                return Err(FxError::Request(format!("unknown source policy {other}")))
            }
            name => AggregationPolicy::SpecificSource(name.to_string()),
        };
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policies() {
        assert_eq!(":any".parse::<AggregationPolicy>().unwrap(), AggregationPolicy::AnySource);
        assert_eq!(":average".parse::<AggregationPolicy>().unwrap(), AggregationPolicy::Average);
        assert_eq!(
            "bca".parse::<AggregationPolicy>().unwrap(),
            AggregationPolicy::SpecificSource("bca".into())
        );
        assert!(matches!("".parse::<AggregationPolicy>(), Err(FxError::Request(_))));
        assert!(matches!(":median".parse::<AggregationPolicy>(), Err(FxError::Request(_))));
    }

    #[test]
    fn test_display_parses_back() {
        for text in [":any", ":all", ":highest", ":lowest", ":newest", ":oldest", ":average", "gmc"] {
            let policy: AggregationPolicy = text.parse().unwrap();
            assert_eq!(policy.to_string(), text);
        }
    }

    #[test]
    fn test_policy_shape() {
        assert!(AggregationPolicy::AnySource.stops_on_first());
        assert!(!AggregationPolicy::AnySource.is_multi_source());
        assert!(!AggregationPolicy::SpecificSource("bca".into()).is_multi_source());
        assert!(AggregationPolicy::Average.is_multi_source());
        assert_eq!(AggregationPolicy::SpecificSource("bca".into()).specific_source(), Some("bca"));
    }
}
