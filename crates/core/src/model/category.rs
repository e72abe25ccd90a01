use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::model::ids::ModuleId;

/// Bucket name for questions with no usable category tag.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Validated category name (trimmed, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a validated category name.
    ///
    /// # Errors
    ///
    /// Returns `CategoryError::EmptyName` if the name is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, CategoryError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CategoryError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn uncategorized() -> Self {
        Self(UNCATEGORIZED.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CategoryName {
    type Error = CategoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CategoryName> for String {
    fn from(name: CategoryName) -> Self {
        name.0
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CategoryError {
    #[error("category name cannot be empty")]
    EmptyName,

    #[error("weight for {category} must be finite and non-negative, got {weight}")]
    InvalidWeight { category: String, weight: f64 },

    #[error("duplicate category in weight table: {0}")]
    Duplicate(String),

    #[error("weight table has no positive weight")]
    AllZero,

    #[error("weights sum past the largest finite value")]
    TotalOverflow,
}

//
// ─── WEIGHT TABLE ──────────────────────────────────────────────────────────────
//

/// Category name -> relative weight, in insertion order.
///
/// Weights need not sum to 1. Iteration order is significant: it breaks ties when
/// remainder units are handed out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoryWeightTable {
    entries: Vec<(CategoryName, f64)>,
}

impl CategoryWeightTable {
    /// Build a table from ordered entries.
    ///
    /// # Errors
    ///
    /// Returns `CategoryError` on an empty name, a negative or non-finite weight,
    /// a duplicate category, weights whose sum is not finite, or when a non-empty
    /// table has no positive weight.
    pub fn new<I, S>(entries: I) -> Result<Self, CategoryError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (name, weight) in entries {
            let name = CategoryName::new(name)?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(CategoryError::InvalidWeight {
                    category: name.to_string(),
                    weight,
                });
            }
            if table.weight(&name).is_some() {
                return Err(CategoryError::Duplicate(name.to_string()));
            }
            table.entries.push((name, weight));
        }
        let total = table.total();
        if !total.is_finite() {
            return Err(CategoryError::TotalOverflow);
        }
        if !table.entries.is_empty() && total <= 0.0 {
            return Err(CategoryError::AllZero);
        }
        Ok(table)
    }

    #[must_use]
    pub fn entries(&self) -> &[(CategoryName, f64)] {
        &self.entries
    }

    #[must_use]
    pub fn weight(&self, name: &CategoryName) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
    }

    #[must_use]
    pub fn contains(&self, name: &CategoryName) -> bool {
        self.weight(name).is_some()
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CategoryWeightTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, weight) in &self.entries {
            map.serialize_entry(name.as_str(), weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryWeightTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = CategoryWeightTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category name to weight")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, f64)> = Vec::new();
                while let Some((name, weight)) = access.next_entry::<String, f64>()? {
                    entries.push((name, weight));
                }
                CategoryWeightTable::new(entries).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Ties a bank to the category its questions are pooled under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub module: ModuleId,
    #[serde(default)]
    pub category: Option<CategoryName>,
}
