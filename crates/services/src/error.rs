//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{ModuleId, QuestionId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the quiz session engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),
    #[error("no active session")]
    NoActiveSession,
    #[error("session already completed")]
    SessionCompleted,
    #[error("no usable questions in {0}")]
    EmptyBank(ModuleId),
    #[error("{len} questions do not fit in a single run")]
    RunTooLarge { len: usize },
    #[error("question {0} is not part of the current run")]
    UnknownQuestion(QuestionId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while wiring the engine to its backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
