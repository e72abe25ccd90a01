use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::model::{Letter, ModuleId, QuestionCount, QuizSettings, SessionKey};
use quiz_core::sources::fixed_now;
use serde_json::{Value, json};
use services::{Clock, EngineError, NextOutcome, Phase, QuizEngine, RandomSource, ServedQuestion};
use storage::repository::{BankSource, InMemoryBankSource, SessionStore, Storage, StorageError};

fn module(id: &str) -> ModuleId {
    ModuleId::new(id).unwrap()
}

fn letter(c: char) -> Letter {
    Letter::from_char(c).unwrap()
}

/// Ten questions whose answer is always B, in the mixed shapes real banks use.
fn cardiac_bank() -> Value {
    let mut questions = Vec::new();
    for i in 0..10 {
        let record = match i % 3 {
            0 => json!({
                "id": format!("c{i}"),
                "question": format!("Cardiac item {i}"),
                "choices": ["alpha", "beta", "gamma"],
                "answer": "B",
                "explanation": "beta it is",
            }),
            1 => json!({
                "id": format!("c{i}"),
                "stem": format!("Cardiac item {i}"),
                "options": [
                    {"text": "alpha"},
                    {"text": "beta", "is_correct": true},
                    {"text": "gamma"},
                ],
                "rationale": "beta it is",
            }),
            _ => json!({
                "id": format!("c{i}"),
                "prompt": format!("Cardiac item {i}"),
                "options": {"a": "alpha", "b": "beta", "c": "gamma"},
                "correct_answers": [1],
            }),
        };
        questions.push(record);
    }
    json!({ "questions": questions })
}

fn engine_with(banks: InMemoryBankSource) -> (QuizEngine, Arc<dyn SessionStore>) {
    let storage = Storage::in_memory(Arc::new(banks));
    let sessions = storage.sessions.clone();
    let engine = QuizEngine::new(storage, QuizSettings::default())
        .with_clock(Clock::fixed(fixed_now()))
        .with_random(RandomSource::seeded(2024));
    (engine, sessions)
}

fn engine() -> QuizEngine {
    let banks = InMemoryBankSource::new();
    banks.insert(module("Cardiac"), cardiac_bank()).unwrap();
    banks
        .insert(module("Broken"), json!({"questions": [{"stem": "no options"}]}))
        .unwrap();
    engine_with(banks).0
}

async fn serve(engine: &QuizEngine, key: SessionKey) -> ServedQuestion {
    match engine.next_question(key).await.unwrap() {
        NextOutcome::Question(q) => q,
        NextOutcome::Done(_) => panic!("expected a question"),
    }
}

#[tokio::test]
async fn five_correct_answers_score_full_marks() {
    let engine = engine();
    let key = SessionKey::generate();
    let total = engine
        .start_session(key, &module("Cardiac"), Some(QuestionCount::Exact(5)))
        .await
        .unwrap();
    assert_eq!(total, 5);

    for served in 1..=5 {
        let q = serve(&engine, key).await;
        assert_eq!(q.served_count, served);
        assert_eq!(q.options.len(), 3);
        let feedback = engine.submit_answer(key, &q.id, &[letter('B')]).await.unwrap();
        assert!(feedback.correct);
        // the mapping-shaped records carry no rationale
        let index: usize = q.stem.rsplit(' ').next().unwrap().parse().unwrap();
        assert_eq!(feedback.rationale.is_empty(), index % 3 == 2);
    }

    let NextOutcome::Done(done) = engine.next_question(key).await.unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(done.first_try_correct, 5);
    assert_eq!(done.first_try_total, 5);
    assert_eq!(done.first_try_pct, 100);
    assert_eq!(done.review.len(), 5);
    assert!(done.missed.is_empty());
    assert_eq!(done.completed_at, Some(fixed_now()));
    assert_eq!(engine.phase(key).await.unwrap(), Phase::Exhausted);
}

#[tokio::test]
async fn misses_resurface_until_answered() {
    let engine = engine();
    let key = SessionKey::generate();
    engine
        .start_session(key, &module("Cardiac"), Some(QuestionCount::Exact(3)))
        .await
        .unwrap();

    // first pass: everything wrong
    let mut first_pass = Vec::new();
    for _ in 0..3 {
        let q = serve(&engine, key).await;
        let feedback = engine.submit_answer(key, &q.id, &[letter('A')]).await.unwrap();
        assert!(!feedback.correct);
        assert_eq!(feedback.correct_letters, vec![letter('B')]);
        first_pass.push(q.id);
    }

    // retry pass replays misses in the order they accumulated
    for expected in &first_pass {
        let q = serve(&engine, key).await;
        assert_eq!(&q.id, expected);
        let feedback = engine.submit_answer(key, &q.id, &[letter('B')]).await.unwrap();
        assert!(feedback.correct);
        assert_eq!(feedback.first_try_correct, 0);
    }

    let NextOutcome::Done(done) = engine.next_question(key).await.unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(done.first_try_correct, 0);
    assert_eq!(done.first_try_pct, 0);
    assert_eq!(done.served_count, 6);
    assert!(done.served_count > done.first_try_total);
    assert_eq!(done.missed, first_pass);
}

#[tokio::test]
async fn resubmitting_never_changes_the_score() {
    let engine = engine();
    let key = SessionKey::generate();
    engine
        .start_session(key, &module("Cardiac"), Some(QuestionCount::Exact(2)))
        .await
        .unwrap();

    let q = serve(&engine, key).await;
    let first = engine.submit_answer(key, &q.id, &[letter('B')]).await.unwrap();
    assert_eq!(first.first_try_correct, 1);
    for pick in ['A', 'B', 'C', 'B'] {
        let again = engine.submit_answer(key, &q.id, &[letter(pick)]).await.unwrap();
        assert_eq!(again.first_try_correct, 1);
    }
}

#[tokio::test]
async fn reset_then_next_is_no_active_session() {
    let engine = engine();
    let key = SessionKey::generate();
    engine.start_session(key, &module("Cardiac"), None).await.unwrap();
    serve(&engine, key).await;

    engine.reset_session(key).await.unwrap();
    assert_eq!(engine.phase(key).await.unwrap(), Phase::Idle);
    let err = engine.next_question(key).await.unwrap_err();
    assert!(matches!(err, EngineError::NoActiveSession));
}

#[tokio::test]
async fn unknown_module_is_module_not_found() {
    let engine = engine();
    let err = engine
        .start_session(SessionKey::generate(), &module("Neuro"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ModuleNotFound(m) if m.as_str() == "Neuro"));
}

#[tokio::test]
async fn empty_bank_fails_without_touching_the_run() {
    let engine = engine();
    let key = SessionKey::generate();
    engine
        .start_session(key, &module("Cardiac"), Some(QuestionCount::Exact(2)))
        .await
        .unwrap();
    let current = serve(&engine, key).await;

    let err = engine
        .start_session(key, &module("Broken"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyBank(_)));

    // the earlier run is still live and still knows its question
    assert_eq!(engine.phase(key).await.unwrap(), Phase::Active);
    let feedback = engine
        .submit_answer(key, &current.id, &[letter('B')])
        .await
        .unwrap();
    assert!(feedback.correct);
}

#[tokio::test]
async fn full_count_serves_whole_bank() {
    let engine = engine();
    let key = SessionKey::generate();
    let count: QuestionCount = "full".parse().unwrap();
    let total = engine
        .start_session(key, &module("Cardiac"), Some(count))
        .await
        .unwrap();
    assert_eq!(total, 10);
}

#[tokio::test]
async fn consecutive_starts_avoid_the_same_sample() {
    let banks = InMemoryBankSource::new();
    banks.insert(module("Cardiac"), cardiac_bank()).unwrap();
    let (engine, sessions) = engine_with(banks);
    let key = SessionKey::generate();

    let mut previous = None;
    for _ in 0..10 {
        engine
            .start_session(key, &module("Cardiac"), Some(QuestionCount::Exact(9)))
            .await
            .unwrap();
        let record = sessions.get(key).await.unwrap().unwrap();
        let drawn = record.last_draw(&module("Cardiac"), 9).cloned().unwrap();
        assert_ne!(previous.as_ref(), Some(&drawn));
        previous = Some(drawn);
    }
}

#[tokio::test]
async fn retry_missed_runs_only_first_try_misses() {
    let engine = engine();
    let key = SessionKey::generate();
    engine
        .start_session(key, &module("Cardiac"), Some(QuestionCount::Exact(4)))
        .await
        .unwrap();

    let mut missed = Vec::new();
    for i in 0..4 {
        let q = serve(&engine, key).await;
        let pick = if i % 2 == 0 { 'C' } else { 'B' };
        if pick == 'C' {
            missed.push(q.id.clone());
        }
        engine.submit_answer(key, &q.id, &[letter(pick)]).await.unwrap();
    }
    for _ in 0..2 {
        let q = serve(&engine, key).await;
        engine.submit_answer(key, &q.id, &[letter('B')]).await.unwrap();
    }
    assert!(engine.next_question(key).await.unwrap().is_done());

    assert_eq!(engine.start_missed(key).await.unwrap(), 2);
    let mut replayed = vec![serve(&engine, key).await.id, serve(&engine, key).await.id];
    replayed.sort();
    missed.sort();
    assert_eq!(replayed, missed);
}

struct FailingBanks;

#[async_trait]
impl BankSource for FailingBanks {
    async fn load(&self, _module: &ModuleId) -> Result<Value, StorageError> {
        Err(StorageError::Connection("disk unplugged".into()))
    }
}

#[tokio::test]
async fn backend_failures_are_storage_errors() {
    let engine = QuizEngine::new(
        Storage::in_memory(Arc::new(FailingBanks)),
        QuizSettings::default(),
    );
    let err = engine
        .start_session(SessionKey::generate(), &module("Cardiac"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::Connection(_))));
}
