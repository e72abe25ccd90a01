#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;
pub mod weighted;

pub use quiz_core::{Clock, RandomSource};

pub use error::{EngineError, EngineInitError};
pub use sessions::{
    AnswerFeedback, Completion, NextOutcome, Phase, QuizEngine, QuizSession, ReviewItem,
    ServedQuestion,
};
pub use weighted::{Shortfall, WeightedDraw, apportion, sample_weighted};
