use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The closed set of match strategies.
///
/// Dispatch is exhaustive over this enum, so an unsupported method is a
/// parse-time error carrying the valid alternatives rather than a lookup
/// failure deep inside the query path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Whole-name equality, case-insensitive, length-sensitive.
    Exact,
    /// Contiguous quoted phrase.
    Phrase,
    /// Query characters contiguous inside a name.
    Substring,
    /// All tokens present, any order.
    Permuted,
    /// Any token present.
    Partial,
    /// Phonetic + bounded edit-distance approximation.
    Fuzzy,
}

impl MatchMethod {
    pub const ALL: [MatchMethod; 6] = [
        MatchMethod::Exact,
        MatchMethod::Phrase,
        MatchMethod::Substring,
        MatchMethod::Permuted,
        MatchMethod::Partial,
        MatchMethod::Fuzzy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Phrase => "phrase",
            MatchMethod::Substring => "substring",
            MatchMethod::Permuted => "permuted",
            MatchMethod::Partial => "partial",
            MatchMethod::Fuzzy => "fuzzy",
        }
    }

    /// Whether `ranks` applies to this method. Exact matching has a single
    /// tier by construction, so rank grouping is a no-op there.
    pub fn supports_ranks(&self) -> bool {
        !matches!(self, MatchMethod::Exact)
    }

    fn valid_list() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for MatchMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(MatchMethod::Exact),
            "phrase" => Ok(MatchMethod::Phrase),
            "substring" => Ok(MatchMethod::Substring),
            "permuted" => Ok(MatchMethod::Permuted),
            "partial" => Ok(MatchMethod::Partial),
            "fuzzy" => Ok(MatchMethod::Fuzzy),
            other => Err(Error::UnknownMethod {
                given: other.to_string(),
                valid: Self::valid_list(),
            }),
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for method in MatchMethod::ALL {
            assert_eq!(method.as_str().parse::<MatchMethod>().unwrap(), method);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("FUZZY".parse::<MatchMethod>().unwrap(), MatchMethod::Fuzzy);
    }

    #[test]
    fn unknown_method_lists_valid_ones() {
        let err = "regex".parse::<MatchMethod>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("regex"));
        for method in MatchMethod::ALL {
            assert!(message.contains(method.as_str()));
        }
    }

    #[test]
    fn only_exact_ignores_ranks() {
        for method in MatchMethod::ALL {
            assert_eq!(
                method.supports_ranks(),
                method != MatchMethod::Exact
            );
        }
    }
}
