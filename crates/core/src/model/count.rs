use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Requested quiz length: the whole bank, or a specific number of questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCount {
    All,
    Exact(i64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CountParseError {
    #[error("invalid question count: {0:?}")]
    Invalid(String),
}

impl QuestionCount {
    /// Resolve against the bank size, clamping to `[1, bank_size]`.
    ///
    /// Returns 0 only for an empty bank.
    #[must_use]
    pub fn resolve(self, bank_size: usize) -> usize {
        if bank_size == 0 {
            return 0;
        }
        match self {
            Self::All => bank_size,
            Self::Exact(n) => usize::try_from(n.max(1))
                .unwrap_or(usize::MAX)
                .min(bank_size),
        }
    }
}

impl FromStr for QuestionCount {
    type Err = CountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if ["full", "all", "max"]
            .iter()
            .any(|word| trimmed.eq_ignore_ascii_case(word))
        {
            return Ok(Self::All);
        }
        trimmed
            .parse::<i64>()
            .map(Self::Exact)
            .map_err(|_| CountParseError::Invalid(s.to_string()))
    }
}

impl fmt::Display for QuestionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("full"),
            Self::Exact(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_bank_keywords() {
        for word in ["full", "all", "max", " FULL "] {
            assert_eq!(word.parse::<QuestionCount>().unwrap(), QuestionCount::All);
        }
    }

    #[test]
    fn parses_integers_and_rejects_text() {
        assert_eq!("25".parse::<QuestionCount>().unwrap(), QuestionCount::Exact(25));
        assert!("lots".parse::<QuestionCount>().is_err());
    }

    #[test]
    fn resolve_clamps_to_bank() {
        assert_eq!(QuestionCount::All.resolve(40), 40);
        assert_eq!(QuestionCount::Exact(10).resolve(40), 10);
        assert_eq!(QuestionCount::Exact(100).resolve(40), 40);
        assert_eq!(QuestionCount::Exact(0).resolve(40), 1);
        assert_eq!(QuestionCount::Exact(-3).resolve(40), 1);
        assert_eq!(QuestionCount::Exact(5).resolve(0), 0);
    }
}
