use async_trait::async_trait;
use quiz_core::model::ModuleId;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::repository::{BankSource, StorageError};

/// Reads `<root>/<module>.json` for each module.
///
/// Module ids are looked up directly; the directory is never scanned.
#[derive(Debug, Clone)]
pub struct JsonFileBankSource {
    root: PathBuf,
}

impl JsonFileBankSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a module, or `None` if the id could escape the root directory.
    fn path_for(&self, module: &ModuleId) -> Option<PathBuf> {
        let id = module.as_str();
        if id.contains(['/', '\\']) || id.contains("..") || id.starts_with('.') {
            return None;
        }
        let file = if id.to_ascii_lowercase().ends_with(".json") {
            id.to_string()
        } else {
            format!("{id}.json")
        };
        Some(self.root.join(file))
    }
}

#[async_trait]
impl BankSource for JsonFileBankSource {
    async fn load(&self, module: &ModuleId) -> Result<Value, StorageError> {
        let Some(path) = self.path_for(module) else {
            tracing::warn!(%module, "rejected module id outside bank root");
            return Err(StorageError::NotFound);
        };

        let text = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Connection(format!("{}: {e}", path.display())),
        })?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "loaded bank file");

        serde_json::from_str(&text)
            .map_err(|e| StorageError::Serialization(format!("{}: {e}", path.display())))
    }
}
