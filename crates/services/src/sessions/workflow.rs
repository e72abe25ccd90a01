use std::sync::Arc;

use quiz_core::model::{
    Letter, ModuleId, Question, QuestionBank, QuestionCount, QuestionId, QuizSettings, SessionKey,
};
use quiz_core::normalize_with_report;
use storage::repository::{BankSource, SessionStore, Storage, StorageError};

use super::machine::{Phase, QuizSession};
use super::view::{AnswerFeedback, NextOutcome};
use crate::error::{EngineError, EngineInitError};
use crate::weighted::sample_weighted;
use crate::{Clock, RandomSource};

/// Per-session quiz orchestration over swappable bank and session backends.
///
/// Each call loads the session record, applies one state transition, and
/// writes the record back. Callers must not run two calls for the same
/// session key at once.
#[derive(Clone)]
pub struct QuizEngine {
    banks: Arc<dyn BankSource>,
    sessions: Arc<dyn SessionStore>,
    clock: Clock,
    random: RandomSource,
    settings: QuizSettings,
}

impl QuizEngine {
    #[must_use]
    pub fn new(storage: Storage, settings: QuizSettings) -> Self {
        Self {
            banks: storage.banks,
            sessions: storage.sessions,
            clock: Clock::default(),
            random: RandomSource::default(),
            settings,
        }
    }

    /// Engine whose sessions are persisted in `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if the database cannot be opened or migrated.
    pub async fn sqlite(
        database_url: &str,
        banks: Arc<dyn BankSource>,
        settings: QuizSettings,
    ) -> Result<Self, EngineInitError> {
        let storage = Storage::sqlite(database_url, banks).await?;
        Ok(Self::new(storage, settings))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_random(mut self, random: RandomSource) -> Self {
        self.random = random;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &QuizSettings {
        &self.settings
    }

    /// Start a run over `module`, replacing any run already held by `key`.
    ///
    /// `count` of `None` uses the configured default.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ModuleNotFound` for an unknown module,
    /// `EngineError::EmptyBank` when it has no usable questions, or storage errors.
    pub async fn start_session(
        &self,
        key: SessionKey,
        module: &ModuleId,
        count: Option<QuestionCount>,
    ) -> Result<u32, EngineError> {
        let count =
            count.unwrap_or_else(|| QuestionCount::Exact(i64::from(self.settings.default_count)));
        let bank = self.load_bank(module).await?;
        let mut session = self.load(key).await?;

        let mut rng = self.random.rng();
        let total = session.start(
            &bank,
            count,
            self.settings.resample_attempts,
            &mut rng,
            self.clock.now(),
        )?;
        self.save(key, session).await?;

        tracing::info!(%key, %module, %count, total, "quiz session started");
        Ok(total)
    }

    /// Serve the next question or, once the run drains, its completion summary.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoActiveSession` if `key` has no run, or storage errors.
    pub async fn next_question(&self, key: SessionKey) -> Result<NextOutcome, EngineError> {
        let mut session = self.load(key).await?;
        let was_active = session.phase() == Phase::Active;
        let outcome = session.next(self.clock.now())?;
        self.save(key, session).await?;

        if let (true, NextOutcome::Done(done)) = (was_active, &outcome) {
            tracing::info!(
                %key,
                first_try_correct = done.first_try_correct,
                first_try_total = done.first_try_total,
                served = done.served_count,
                "quiz session completed"
            );
        }
        Ok(outcome)
    }

    /// Grade an answer for question `id` of the current run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoActiveSession`, `EngineError::SessionCompleted`,
    /// `EngineError::UnknownQuestion`, or storage errors.
    pub async fn submit_answer(
        &self,
        key: SessionKey,
        id: &QuestionId,
        selected: &[Letter],
    ) -> Result<AnswerFeedback, EngineError> {
        let mut session = self.load(key).await?;
        let feedback = session.answer(id, selected)?;
        self.save(key, session).await?;
        tracing::debug!(%key, %id, correct = feedback.correct, "answer graded");
        Ok(feedback)
    }

    /// Discard the run held by `key`. Idle sessions are left as they are.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn reset_session(&self, key: SessionKey) -> Result<(), EngineError> {
        let Some(record) = self.sessions.get(key).await? else {
            return Ok(());
        };
        let mut session = QuizSession::from_record(record);
        session.reset();
        self.save(key, session).await?;
        tracing::debug!(%key, "quiz session reset");
        Ok(())
    }

    /// Current phase of the run held by `key`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn phase(&self, key: SessionKey) -> Result<Phase, EngineError> {
        Ok(self.load(key).await?.phase())
    }

    /// Start a run over the questions missed on first try in the finished run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoActiveSession` unless the run is exhausted,
    /// `EngineError::EmptyBank` if nothing was missed, or storage errors.
    pub async fn start_missed(&self, key: SessionKey) -> Result<u32, EngineError> {
        let mut session = self.load(key).await?;
        let mut rng = self.random.rng();
        let total = session.start_missed(&mut rng, self.clock.now())?;
        self.save(key, session).await?;
        tracing::info!(%key, total, "retry run over missed questions started");
        Ok(total)
    }

    /// Assemble a composite quiz of up to `total` questions across the catalog,
    /// proportioned by the configured category weights.
    ///
    /// Catalog modules that do not exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns storage errors other than a missing module.
    pub async fn build_weighted_quiz(&self, total: usize) -> Result<Vec<Question>, EngineError> {
        let mut pool = Vec::new();
        for entry in &self.settings.catalog {
            let bank = match self.load_bank(&entry.module).await {
                Ok(bank) => bank,
                Err(EngineError::ModuleNotFound(module)) => {
                    tracing::warn!(%module, "catalog module missing, skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            pool.extend(bank.usable().into_iter().map(|q| {
                let pooled = q
                    .clone()
                    .with_id(QuestionId::new(format!("{}/{}", entry.module, q.id())));
                match &entry.category {
                    Some(category) => pooled.with_category(category.clone()),
                    None => pooled,
                }
            }));
        }

        let mut rng = self.random.rng();
        let draw = sample_weighted(pool, &self.settings.weights, total, &mut rng);
        for short in &draw.shortfalls {
            tracing::warn!(
                category = %short.category,
                desired = short.desired,
                drawn = short.drawn,
                "category under-filled in weighted quiz"
            );
        }
        Ok(draw.questions)
    }

    /// Start a run over a freshly built weighted composite quiz.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EmptyBank` if the composite is empty, or storage errors.
    pub async fn start_weighted_session(
        &self,
        key: SessionKey,
        total: usize,
    ) -> Result<u32, EngineError> {
        let module = ModuleId::weighted();
        let questions = self.build_weighted_quiz(total).await?;
        if questions.is_empty() {
            return Err(EngineError::EmptyBank(module));
        }

        let mut session = self.load(key).await?;
        let count = session.begin(module, questions, self.clock.now())?;
        self.save(key, session).await?;
        tracing::info!(%key, total = count, "weighted quiz session started");
        Ok(count)
    }

    async fn load_bank(&self, module: &ModuleId) -> Result<QuestionBank, EngineError> {
        let raw = self.banks.load(module).await.map_err(|e| match e {
            StorageError::NotFound => EngineError::ModuleNotFound(module.clone()),
            other => EngineError::Storage(other),
        })?;

        let normalized = normalize_with_report(&raw);
        for issue in &normalized.issues {
            tracing::warn!(%module, %issue, "lenient normalization");
        }
        Ok(QuestionBank::new(module.clone(), normalized.questions))
    }

    async fn load(&self, key: SessionKey) -> Result<QuizSession, EngineError> {
        let record = self.sessions.get(key).await?.unwrap_or_default();
        Ok(QuizSession::from_record(record))
    }

    async fn save(&self, key: SessionKey, session: QuizSession) -> Result<(), EngineError> {
        self.sessions.put(key, &session.into_record()).await?;
        Ok(())
    }
}
