use chrono::{DateTime, Utc};
use serde::Serialize;

use quiz_core::model::{Letter, Question, QuestionId, QuestionOption, SessionState};

/// A question as served to the quiz taker; the answer stays hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServedQuestion {
    pub id: QuestionId,
    pub stem: String,
    pub options: Vec<QuestionOption>,
    pub is_multi_select: bool,
    pub served_count: u32,
}

impl ServedQuestion {
    #[must_use]
    pub fn new(question: &Question, served_count: u32) -> Self {
        Self {
            id: question.id().clone(),
            stem: question.stem().to_string(),
            options: question.options().to_vec(),
            is_multi_select: question.is_multi_select(),
            served_count,
        }
    }
}

/// One question with its answer, for post-quiz study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewItem {
    pub id: QuestionId,
    pub stem: String,
    pub options: Vec<QuestionOption>,
    pub correct_letters: Vec<Letter>,
    pub rationale: String,
}

impl From<&Question> for ReviewItem {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id().clone(),
            stem: question.stem().to_string(),
            options: question.options().to_vec(),
            correct_letters: question.correct_letters().iter().copied().collect(),
            rationale: question.rationale().to_string(),
        }
    }
}

/// Summary returned once both queues are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub first_try_correct: u32,
    pub first_try_total: u32,
    pub first_try_pct: u32,
    pub served_count: u32,
    pub review: Vec<ReviewItem>,
    /// Ids answered wrong on their first attempt, in draw order.
    pub missed: Vec<QuestionId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Completion {
    #[must_use]
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            first_try_correct: state.first_try_correct(),
            first_try_total: state.first_try_total(),
            first_try_pct: state.first_try_pct(),
            served_count: state.served_count(),
            review: state.review().map(ReviewItem::from).collect(),
            missed: state.missed().map(|q| q.id().clone()).collect(),
            started_at: state.started_at(),
            completed_at: state.completed_at(),
        }
    }
}

/// Result of asking for the next question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NextOutcome {
    Question(ServedQuestion),
    Done(Completion),
}

impl NextOutcome {
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Grading result for one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub correct_letters: Vec<Letter>,
    pub rationale: String,
    pub first_try_correct: u32,
    pub first_try_total: u32,
}
