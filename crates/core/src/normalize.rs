//! Question bank normalization.
//!
//! Turns heterogeneous raw bank records into canonical [`Question`]s. Each logical
//! attribute is read through an ordered list of fallback field names; the first
//! non-empty value wins. Normalization never fails: a malformed record still yields
//! a best-effort question, and what had to be patched up is reported as a
//! [`MalformedRecord`] diagnostic.

use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::model::{CategoryName, Letter, MAX_OPTIONS, Question, QuestionId, QuestionOption};

pub const ID_FIELDS: &[&str] = &["id"];
pub const STEM_FIELDS: &[&str] = &["stem", "question", "prompt", "text"];
pub const OPTION_LIST_FIELDS: &[&str] = &["options", "answers", "choices"];
pub const OPTION_TEXT_FIELDS: &[&str] = &["text", "answer", "label", "value"];
pub const OPTION_FLAG_FIELDS: &[&str] = &["correct", "is_correct", "right"];
pub const ANSWER_FIELDS: &[&str] = &["correct_answers", "correct", "answer", "key", "answers_key"];
pub const RATIONALE_FIELDS: &[&str] = &["rationale", "explanation", "why"];
pub const CATEGORY_FIELDS: &[&str] = &["category", "topic"];

/// Exact stem marker that makes a question multi-select. Case and punctuation matter.
pub const MULTI_SELECT_MARKER: &str = "(Select all that apply.)";

//
// ─── DIAGNOSTICS ───────────────────────────────────────────────────────────────
//

/// What was wrong with a record and how it was patched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordIssue {
    #[error("record is not an object")]
    NotAnObject,
    #[error("no stem text found")]
    MissingStem,
    #[error("no options found")]
    NoOptions,
    #[error("{dropped} option(s) past the 8th were dropped")]
    TooManyOptions { dropped: usize },
    #[error("answer references options that do not exist")]
    OutOfRangeAnswer,
    #[error("no correct answer could be parsed; defaulted to A")]
    DefaultedAnswer,
    #[error("single-answer question listed several correct letters; kept {kept}, dropped {dropped}")]
    DroppedExtraCorrect { kept: Letter, dropped: usize },
    #[error("duplicate id {0:?}; replaced with a positional id")]
    DuplicateId(String),
}

/// Diagnostic for one record that needed lenient defaulting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("record {index} ({id}): {issue}")]
pub struct MalformedRecord {
    pub index: usize,
    pub id: QuestionId,
    pub issue: RecordIssue,
}

/// Questions plus the diagnostics raised while producing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub questions: Vec<Question>,
    pub issues: Vec<MalformedRecord>,
}

//
// ─── ENTRY POINTS ──────────────────────────────────────────────────────────────
//

/// Normalize raw bank content into canonical questions, in input order.
#[must_use]
pub fn normalize(raw: &Value) -> Vec<Question> {
    normalize_with_report(raw).questions
}

/// Like [`normalize`], also returning per-record diagnostics.
#[must_use]
pub fn normalize_with_report(raw: &Value) -> Normalized {
    let records: Vec<&Value> = match raw {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("questions") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![raw],
        },
        other => vec![other],
    };

    let mut out = Normalized::default();
    let mut seen_ids = HashSet::new();
    for (index, record) in records.into_iter().enumerate() {
        let question = normalize_record(index, record, &mut seen_ids, &mut out.issues);
        out.questions.push(question);
    }
    out
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

fn normalize_record(
    index: usize,
    record: &Value,
    seen_ids: &mut HashSet<QuestionId>,
    issues: &mut Vec<MalformedRecord>,
) -> Question {
    let mut report = |id: &QuestionId, issue: RecordIssue| {
        issues.push(MalformedRecord {
            index,
            id: id.clone(),
            issue,
        });
    };

    let Value::Object(fields) = record else {
        let id = unique_id(QuestionId::positional(index), index, seen_ids);
        report(&id, RecordIssue::NotAnObject);
        return Question::assemble(
            id,
            String::new(),
            Vec::new(),
            BTreeSet::new(),
            String::new(),
            false,
            None,
        );
    };

    let id = match first_text(fields, ID_FIELDS) {
        Some(explicit) => {
            let explicit = QuestionId::new(explicit);
            if seen_ids.contains(&explicit) {
                let replacement = unique_id(QuestionId::positional(index), index, seen_ids);
                report(&replacement, RecordIssue::DuplicateId(explicit.to_string()));
                replacement
            } else {
                seen_ids.insert(explicit.clone());
                explicit
            }
        }
        None => unique_id(QuestionId::positional(index), index, seen_ids),
    };

    let stem = first_text(fields, STEM_FIELDS).unwrap_or_default();
    if stem.is_empty() {
        report(&id, RecordIssue::MissingStem);
    }

    let raw_options = raw_options(fields);
    if raw_options.is_empty() {
        report(&id, RecordIssue::NoOptions);
    }
    if raw_options.len() > MAX_OPTIONS {
        report(
            &id,
            RecordIssue::TooManyOptions {
                dropped: raw_options.len() - MAX_OPTIONS,
            },
        );
    }

    let mut options = Vec::with_capacity(raw_options.len().min(MAX_OPTIONS));
    let mut correct = BTreeSet::new();
    for (i, raw) in raw_options.into_iter().take(MAX_OPTIONS).enumerate() {
        let Some(letter) = Letter::from_index(i) else {
            break;
        };
        let (text, flagged) = option_parts(raw);
        if flagged {
            correct.insert(letter);
        }
        options.push(QuestionOption { letter, text });
    }

    if correct.is_empty() {
        if let Some(answer) = first_present(fields, ANSWER_FIELDS) {
            let (letters, out_of_range) = answer_letters(answer, options.len());
            if out_of_range {
                report(&id, RecordIssue::OutOfRangeAnswer);
            }
            correct = letters;
        }
    }

    if correct.is_empty() && !options.is_empty() {
        if let Some(first) = Letter::from_index(0) {
            correct.insert(first);
        }
        report(&id, RecordIssue::DefaultedAnswer);
    }

    let is_multi_select = stem.contains(MULTI_SELECT_MARKER);
    if !is_multi_select && correct.len() > 1 {
        let dropped = correct.len() - 1;
        if let Some(kept) = correct.pop_first() {
            report(&id, RecordIssue::DroppedExtraCorrect { kept, dropped });
            correct = BTreeSet::from([kept]);
        }
    }

    let rationale = first_text(fields, RATIONALE_FIELDS).unwrap_or_default();
    let category = first_text(fields, CATEGORY_FIELDS).and_then(|c| CategoryName::new(c).ok());

    Question::assemble(
        id,
        stem,
        options,
        correct,
        rationale,
        is_multi_select,
        category,
    )
}

fn unique_id(
    candidate: QuestionId,
    index: usize,
    seen_ids: &mut HashSet<QuestionId>,
) -> QuestionId {
    let mut id = candidate;
    let mut suffix = 1_usize;
    while seen_ids.contains(&id) {
        id = QuestionId::new(format!("q{index}_{suffix}"));
        suffix += 1;
    }
    seen_ids.insert(id.clone());
    id
}

//
// ─── FIELD HELPERS ─────────────────────────────────────────────────────────────
//

/// Scalar rendered as trimmed text; `None` for empty strings and non-scalars.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find_map(scalar_text)
}

/// First field that holds something other than null, `false`, or an empty string/list/map.
fn first_present<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| match value {
            Value::Null | Value::Bool(false) => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => true,
        })
}

fn raw_options(fields: &Map<String, Value>) -> Vec<&Value> {
    for name in OPTION_LIST_FIELDS {
        match fields.get(*name) {
            Some(Value::Array(items)) if !items.is_empty() => return items.iter().collect(),
            Some(Value::Object(map)) if !map.is_empty() => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                return keys.into_iter().filter_map(|k| map.get(k)).collect();
            }
            _ => {}
        }
    }
    Vec::new()
}

fn option_parts(raw: &Value) -> (String, bool) {
    match raw {
        Value::Object(fields) => {
            let text = first_text(fields, OPTION_TEXT_FIELDS).unwrap_or_default();
            let flagged = OPTION_FLAG_FIELDS
                .iter()
                .filter_map(|name| fields.get(*name))
                .any(is_truthy);
            (text, flagged)
        }
        other => (scalar_text(other).unwrap_or_default(), false),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty()
                && !["false", "no", "0"]
                    .iter()
                    .any(|falsy| s.eq_ignore_ascii_case(falsy))
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

//
// ─── ANSWER PARSING ────────────────────────────────────────────────────────────
//

/// Letters named by a question-level answer value, restricted to existing options.
///
/// The flag is set when something pointed past the last option.
fn answer_letters(value: &Value, option_count: usize) -> (BTreeSet<Letter>, bool) {
    let mut letters = BTreeSet::new();
    let mut out_of_range = false;
    let mut accept = |letter: Option<Letter>| match letter {
        Some(l) if l.index() < option_count => {
            letters.insert(l);
        }
        _ => out_of_range = true,
    };

    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Number(_) => accept(index_letter(item)),
                    Value::String(s) => text_tokens(s).into_iter().for_each(&mut accept),
                    _ => {}
                }
            }
        }
        Value::Number(_) => accept(index_letter(value)),
        Value::String(s) => text_tokens(s).into_iter().for_each(&mut accept),
        _ => {}
    }

    (letters, out_of_range)
}

/// 0-based numeric index as a letter. Fractions truncate; negatives are rejected.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn index_letter(value: &Value) -> Option<Letter> {
    let n = value.as_f64()?;
    if !(0.0..(MAX_OPTIONS as f64)).contains(&n) {
        return None;
    }
    Letter::from_index(n as usize)
}

/// Letter and index tokens in free text separated by whitespace, commas or semicolons.
///
/// Single letters `A`-`H` (any case) and decimal indices count; other words are skipped.
/// Unrecognised tokens are skipped silently, recognised ones past `H` yield `None`.
fn text_tokens(text: &str) -> Vec<Option<Letter>> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            if token.chars().all(|c| c.is_ascii_digit()) {
                Some(token.parse::<usize>().ok().and_then(Letter::from_index))
            } else {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => Some(Letter::from_char(c)),
                    _ => None,
                }
            }
        })
        .collect()
}
