mod draw;
mod machine;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::EngineError;
pub use machine::{Phase, QuizSession};
pub use view::{AnswerFeedback, Completion, NextOutcome, ReviewItem, ServedQuestion};
pub use workflow::QuizEngine;
