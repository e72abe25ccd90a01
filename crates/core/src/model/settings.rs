use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::category::{CatalogEntry, CategoryWeightTable};

/// Engine tuning and content wiring, loaded from JSON by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizSettings {
    pub default_count: u32,
    pub resample_attempts: u32,
    pub weights: CategoryWeightTable,
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("default_count must be at least 1")]
    ZeroDefaultCount,
    #[error("catalog lists module {0} more than once")]
    DuplicateModule(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            default_count: 10,
            resample_attempts: 6,
            weights: CategoryWeightTable::default(),
            catalog: Vec::new(),
        }
    }
}

impl QuizSettings {
    /// Parse and validate settings from JSON text. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` on malformed JSON or invalid values.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()
    }

    /// # Errors
    ///
    /// Returns `SettingsError` if `default_count` is zero or a module repeats in the catalog.
    pub fn validate(self) -> Result<Self, SettingsError> {
        if self.default_count == 0 {
            return Err(SettingsError::ZeroDefaultCount);
        }
        for (i, entry) in self.catalog.iter().enumerate() {
            if self.catalog[..i].iter().any(|e| e.module == entry.module) {
                return Err(SettingsError::DuplicateModule(entry.module.to_string()));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings = QuizSettings::from_json("{}").unwrap();
        assert_eq!(settings, QuizSettings::default());
        assert_eq!(settings.resample_attempts, 6);
    }

    #[test]
    fn parses_weights_and_catalog() {
        let settings = QuizSettings::from_json(
            r#"{
                "default_count": 25,
                "weights": {"HESI": 0.6, "Pharmacology": 0.4},
                "catalog": [
                    {"module": "HESI_Maternity", "category": "HESI"},
                    {"module": "Cardiovascular_Pharm", "category": "Pharmacology"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(settings.default_count, 25);
        assert_eq!(settings.weights.entries().len(), 2);
        assert_eq!(settings.catalog.len(), 2);
    }

    #[test]
    fn rejects_zero_default_count() {
        let err = QuizSettings::from_json(r#"{"default_count": 0}"#).unwrap_err();
        assert!(matches!(err, SettingsError::ZeroDefaultCount));
    }

    #[test]
    fn rejects_duplicate_catalog_module() {
        let err = QuizSettings::from_json(
            r#"{"catalog": [{"module": "M"}, {"module": "M", "category": "X"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::DuplicateModule(_)));
    }
}
