use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::model::{Letter, ModuleId, Question, QuestionId};

/// How many (module, count) draws a session remembers for repeat avoidance.
const DRAW_MEMORY_LIMIT: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("a run needs at least one question")]
    Empty,

    #[error("too many questions for a single run: {len}")]
    TooManyQuestions { len: usize },

    #[error("question {0} is not part of this run")]
    UnknownQuestion(QuestionId),
}

/// Outcome of recording one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRecord {
    pub correct: bool,
    /// True when this was the question's first-ever attempt in the run.
    pub first_attempt: bool,
}

//
// ─── RUN STATE ─────────────────────────────────────────────────────────────────
//

/// One active quiz run.
///
/// Holds a snapshot of the drawn questions so the run does not depend on the bank
/// being reloaded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    module_id: ModuleId,
    questions: HashMap<QuestionId, Question>,
    initial_order: Vec<QuestionId>,
    main_queue: VecDeque<QuestionId>,
    retry_queue: VecDeque<QuestionId>,
    first_try_total: u32,
    first_try_correct: u32,
    attempted_once: HashSet<QuestionId>,
    missed_first_try: HashSet<QuestionId>,
    served_count: u32,
    current_id: Option<QuestionId>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Start a run over `sample`, served in the given order.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Empty` for an empty sample and
    /// `SessionStateError::TooManyQuestions` if the size does not fit in `u32`.
    pub fn new(
        module_id: ModuleId,
        sample: Vec<Question>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if sample.is_empty() {
            return Err(SessionStateError::Empty);
        }
        let first_try_total = u32::try_from(sample.len())
            .map_err(|_| SessionStateError::TooManyQuestions { len: sample.len() })?;

        let initial_order: Vec<QuestionId> = sample.iter().map(|q| q.id().clone()).collect();
        let questions = sample.into_iter().map(|q| (q.id().clone(), q)).collect();

        Ok(Self {
            module_id,
            questions,
            main_queue: initial_order.iter().cloned().collect(),
            initial_order,
            retry_queue: VecDeque::new(),
            first_try_total,
            first_try_correct: 0,
            attempted_once: HashSet::new(),
            missed_first_try: HashSet::new(),
            served_count: 0,
            current_id: None,
            started_at,
            completed_at: None,
        })
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn initial_order(&self) -> &[QuestionId] {
        &self.initial_order
    }

    #[must_use]
    pub fn main_queue(&self) -> &VecDeque<QuestionId> {
        &self.main_queue
    }

    #[must_use]
    pub fn retry_queue(&self) -> &VecDeque<QuestionId> {
        &self.retry_queue
    }

    #[must_use]
    pub fn first_try_total(&self) -> u32 {
        self.first_try_total
    }

    #[must_use]
    pub fn first_try_correct(&self) -> u32 {
        self.first_try_correct
    }

    /// `round(100 * correct / total)`, or 0 for an empty run.
    #[must_use]
    pub fn first_try_pct(&self) -> u32 {
        if self.first_try_total == 0 {
            return 0;
        }
        let correct = u64::from(self.first_try_correct);
        let total = u64::from(self.first_try_total);
        u32::try_from((200 * correct + total) / (2 * total)).unwrap_or(100)
    }

    #[must_use]
    pub fn served_count(&self) -> u32 {
        self.served_count
    }

    #[must_use]
    pub fn current_id(&self) -> Option<&QuestionId> {
        self.current_id.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.completed_at.is_some()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.get(id)
    }

    /// Every question of the run in initial draw order.
    pub fn review(&self) -> impl Iterator<Item = &Question> {
        self.initial_order
            .iter()
            .filter_map(|id| self.questions.get(id))
    }

    /// Questions answered wrong on their first attempt, in initial draw order.
    pub fn missed(&self) -> impl Iterator<Item = &Question> {
        self.initial_order
            .iter()
            .filter(|id| self.missed_first_try.contains(*id))
            .filter_map(|id| self.questions.get(id))
    }

    /// Serve the next question.
    ///
    /// Drains the main queue first; once empty, the retry queue is moved over in
    /// the order misses accumulated. Returns `None` when both are empty, marking
    /// the run exhausted at `now`.
    pub fn pop_next(&mut self, now: DateTime<Utc>) -> Option<&Question> {
        loop {
            if self.main_queue.is_empty() {
                if self.retry_queue.is_empty() {
                    self.current_id = None;
                    if self.completed_at.is_none() {
                        self.completed_at = Some(now);
                    }
                    return None;
                }
                std::mem::swap(&mut self.main_queue, &mut self.retry_queue);
            }

            let Some(id) = self.main_queue.pop_front() else {
                continue;
            };
            if self.questions.contains_key(&id) {
                self.served_count = self.served_count.saturating_add(1);
                self.current_id = Some(id);
                break;
            }
        }
        self.current_id.as_ref().and_then(|id| self.questions.get(id))
    }

    /// Grade `selected` against question `id` and update first-try bookkeeping.
    ///
    /// Only the first attempt at a question can change the first-try score. A miss
    /// queues the question for the next retry pass unless it is already queued.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::UnknownQuestion` if `id` was not drawn for this run.
    pub fn record_answer(
        &mut self,
        id: &QuestionId,
        selected: &[Letter],
    ) -> Result<AnswerRecord, SessionStateError> {
        let question = self
            .questions
            .get(id)
            .ok_or_else(|| SessionStateError::UnknownQuestion(id.clone()))?;
        let correct = question.grade(selected);

        let first_attempt = self.attempted_once.insert(id.clone());
        if first_attempt {
            if correct {
                self.first_try_correct = self.first_try_correct.saturating_add(1);
            } else {
                self.missed_first_try.insert(id.clone());
            }
        }

        if !correct && !self.retry_queue.contains(id) {
            self.retry_queue.push_back(id.clone());
        }

        Ok(AnswerRecord {
            correct,
            first_attempt,
        })
    }
}

//
// ─── SESSION RECORD ────────────────────────────────────────────────────────────
//

/// Ids of the most recent draw for one (module, count) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawMemory {
    pub module_id: ModuleId,
    pub count: usize,
    pub ids: BTreeSet<QuestionId>,
}

/// Everything kept per session key: the active run and recent draws.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub run: Option<SessionState>,
    #[serde(default)]
    pub recent_draws: Vec<DrawMemory>,
}

impl SessionRecord {
    #[must_use]
    pub fn last_draw(&self, module_id: &ModuleId, count: usize) -> Option<&BTreeSet<QuestionId>> {
        self.recent_draws
            .iter()
            .find(|d| &d.module_id == module_id && d.count == count)
            .map(|d| &d.ids)
    }

    /// Replace the remembered draw for this (module, count) pair.
    pub fn remember_draw(&mut self, module_id: ModuleId, count: usize, ids: BTreeSet<QuestionId>) {
        self.recent_draws
            .retain(|d| !(d.module_id == module_id && d.count == count));
        self.recent_draws.push(DrawMemory {
            module_id,
            count,
            ids,
        });
        if self.recent_draws.len() > DRAW_MEMORY_LIMIT {
            let excess = self.recent_draws.len() - DRAW_MEMORY_LIMIT;
            self.recent_draws.drain(..excess);
        }
    }
}
