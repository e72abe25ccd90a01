use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

use quiz_core::model::{
    Letter, ModuleId, Question, QuestionBank, QuestionCount, QuestionId, SessionRecord,
    SessionState, SessionStateError,
};

use super::draw::draw_sample;
use super::view::{AnswerFeedback, Completion, NextOutcome, ServedQuestion};
use crate::error::EngineError;

/// Where a session's run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Exhausted,
}

/// Quiz state machine over one session's stored record.
///
/// Every transition either succeeds or leaves the record untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizSession {
    record: SessionRecord,
}

impl QuizSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_record(record: SessionRecord) -> Self {
        Self { record }
    }

    #[must_use]
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    #[must_use]
    pub fn into_record(self) -> SessionRecord {
        self.record
    }

    #[must_use]
    pub fn state(&self) -> Option<&SessionState> {
        self.record.run.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match &self.record.run {
            None => Phase::Idle,
            Some(run) if run.is_exhausted() => Phase::Exhausted,
            Some(_) => Phase::Active,
        }
    }

    /// Draw a sample from `bank` and begin a fresh run over it.
    ///
    /// Returns the number of questions in the run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EmptyBank` if the bank has no usable question.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        bank: &QuestionBank,
        count: QuestionCount,
        resample_attempts: u32,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let pool = bank.usable();
        let size = count.resolve(pool.len());
        if size == 0 {
            return Err(EngineError::EmptyBank(bank.module_id().clone()));
        }

        let previous = self.record.last_draw(bank.module_id(), size);
        let sample = draw_sample(&pool, size, previous, resample_attempts, rng);
        let ids: BTreeSet<QuestionId> = sample.iter().map(|q| q.id().clone()).collect();

        let total = self.begin(bank.module_id().clone(), sample, now)?;
        self.record.remember_draw(bank.module_id().clone(), size, ids);
        Ok(total)
    }

    /// Begin a run over an already drawn sample, served in the given order.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EmptyBank` for an empty sample and
    /// `EngineError::RunTooLarge` if it cannot be counted in a `u32`.
    pub fn begin(
        &mut self,
        module_id: ModuleId,
        sample: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let state = SessionState::new(module_id.clone(), sample, now)
            .map_err(|e| run_error(module_id, e))?;
        let total = state.first_try_total();
        self.record.run = Some(state);
        Ok(total)
    }

    /// Start a new run over the questions the finished run missed on first try.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoActiveSession` unless the current run is exhausted,
    /// and `EngineError::EmptyBank` if it had no first-try misses.
    pub fn start_missed<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let run = match (&self.record.run, self.phase()) {
            (Some(run), Phase::Exhausted) => run,
            _ => return Err(EngineError::NoActiveSession),
        };
        let module_id = run.module_id().clone();
        let mut missed: Vec<Question> = run.missed().cloned().collect();
        if missed.is_empty() {
            return Err(EngineError::EmptyBank(module_id));
        }
        missed.shuffle(rng);
        self.begin(module_id, missed, now)
    }

    /// Serve the next question, or the completion summary once both queues drain.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoActiveSession` when idle.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<NextOutcome, EngineError> {
        let run = self
            .record
            .run
            .as_mut()
            .ok_or(EngineError::NoActiveSession)?;
        let served = run.pop_next(now).cloned();
        Ok(match served {
            Some(question) => NextOutcome::Question(ServedQuestion::new(
                &question,
                run.served_count(),
            )),
            None => NextOutcome::Done(Completion::from_state(run)),
        })
    }

    /// Grade an answer for a question of the current run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoActiveSession` when idle, `EngineError::SessionCompleted`
    /// once the run is exhausted, and `EngineError::UnknownQuestion` for an id that
    /// was not drawn.
    pub fn answer(
        &mut self,
        id: &QuestionId,
        selected: &[Letter],
    ) -> Result<AnswerFeedback, EngineError> {
        let run = self
            .record
            .run
            .as_mut()
            .ok_or(EngineError::NoActiveSession)?;
        if run.is_exhausted() {
            return Err(EngineError::SessionCompleted);
        }

        let outcome = run.record_answer(id, selected).map_err(|e| match e {
            SessionStateError::UnknownQuestion(id) => EngineError::UnknownQuestion(id),
            _ => EngineError::NoActiveSession,
        })?;
        let question = run
            .question(id)
            .ok_or_else(|| EngineError::UnknownQuestion(id.clone()))?;

        Ok(AnswerFeedback {
            correct: outcome.correct,
            correct_letters: question.correct_letters().iter().copied().collect(),
            rationale: question.rationale().to_string(),
            first_try_correct: run.first_try_correct(),
            first_try_total: run.first_try_total(),
        })
    }

    /// Drop the run. Draw memory is kept so the next start still avoids repeats.
    pub fn reset(&mut self) {
        self.record.run = None;
    }
}

fn run_error(module_id: ModuleId, err: SessionStateError) -> EngineError {
    match err {
        SessionStateError::TooManyQuestions { len } => EngineError::RunTooLarge { len },
        SessionStateError::UnknownQuestion(id) => EngineError::UnknownQuestion(id),
        _ => EngineError::EmptyBank(module_id),
    }
}
