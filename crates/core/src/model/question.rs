use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

use crate::model::category::CategoryName;
use crate::model::ids::{ModuleId, QuestionId};

/// Practical cap on options per question; letters run `A..=H`.
pub const MAX_OPTIONS: usize = 8;

//
// ─── LETTER ────────────────────────────────────────────────────────────────────
//

/// Option letter, `A` through `H`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Letter(u8);

impl Letter {
    /// Letter for the option at `index` (0-based).
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < MAX_OPTIONS)
            .map(Self)
    }

    /// Parses a letter, case-insensitive.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        let upper = c.to_ascii_uppercase();
        if ('A'..='H').contains(&upper) {
            Some(Self(upper as u8 - b'A'))
        } else {
            None
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    #[must_use]
    pub fn as_char(self) -> char {
        char::from(b'A' + self.0)
    }
}

impl fmt::Debug for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Letter({})", self.as_char())
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl TryFrom<String> for Letter {
    type Error = QuestionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chars = value.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c).ok_or(QuestionError::InvalidLetter(value)),
            _ => Err(QuestionError::InvalidLetter(value)),
        }
    }
}

impl From<Letter> for String {
    fn from(letter: Letter) -> Self {
        letter.as_char().to_string()
    }
}

impl std::str::FromStr for Letter {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("invalid option letter: {0:?}")]
    InvalidLetter(String),

    #[error("too many options: {len} (max 8)")]
    TooManyOptions { len: usize },

    #[error("correct letter {0} has no matching option")]
    UnknownCorrectLetter(Letter),

    #[error("question has options but no correct letter")]
    NoCorrectLetter,

    #[error("single-answer question has {0} correct letters")]
    MultipleCorrect(usize),

    #[error("option {index} is lettered {letter}")]
    MisplacedOption { index: usize, letter: Letter },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub letter: Letter,
    pub text: String,
}

/// Canonical multiple-choice question.
///
/// Deserializing goes through the same checks as [`Question::new`], so a stored
/// run cannot smuggle in a question that breaks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredQuestion")]
pub struct Question {
    id: QuestionId,
    stem: String,
    options: Vec<QuestionOption>,
    correct_letters: BTreeSet<Letter>,
    rationale: String,
    is_multi_select: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<CategoryName>,
}

#[derive(Deserialize)]
struct StoredQuestion {
    id: QuestionId,
    stem: String,
    options: Vec<QuestionOption>,
    correct_letters: BTreeSet<Letter>,
    rationale: String,
    is_multi_select: bool,
    #[serde(default)]
    category: Option<CategoryName>,
}

impl TryFrom<StoredQuestion> for Question {
    type Error = QuestionError;

    fn try_from(stored: StoredQuestion) -> Result<Self, Self::Error> {
        let mut texts = Vec::with_capacity(stored.options.len());
        for (index, option) in stored.options.into_iter().enumerate() {
            if option.letter.index() != index {
                return Err(QuestionError::MisplacedOption {
                    index,
                    letter: option.letter,
                });
            }
            texts.push(option.text);
        }
        let mut question = Self::new(
            stored.id,
            stored.stem,
            texts,
            stored.correct_letters,
            stored.rationale,
            stored.is_multi_select,
        )?;
        question.category = stored.category;
        Ok(question)
    }
}

impl Question {
    /// Build a question from option texts, assigning letters in input order.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if more than `MAX_OPTIONS` options are given, a correct
    /// letter has no option, options exist without a correct letter, or a single-answer
    /// question lists more than one correct letter.
    pub fn new(
        id: QuestionId,
        stem: impl Into<String>,
        option_texts: Vec<String>,
        correct_letters: BTreeSet<Letter>,
        rationale: impl Into<String>,
        is_multi_select: bool,
    ) -> Result<Self, QuestionError> {
        if option_texts.len() > MAX_OPTIONS {
            return Err(QuestionError::TooManyOptions {
                len: option_texts.len(),
            });
        }
        if let Some(letter) = correct_letters
            .iter()
            .find(|letter| letter.index() >= option_texts.len())
        {
            return Err(QuestionError::UnknownCorrectLetter(*letter));
        }
        if !option_texts.is_empty() && correct_letters.is_empty() {
            return Err(QuestionError::NoCorrectLetter);
        }
        if !is_multi_select && correct_letters.len() > 1 {
            return Err(QuestionError::MultipleCorrect(correct_letters.len()));
        }

        let options = option_texts
            .into_iter()
            .enumerate()
            .filter_map(|(i, text)| Letter::from_index(i).map(|letter| QuestionOption { letter, text }))
            .collect();

        Ok(Self::assemble(
            id,
            stem.into(),
            options,
            correct_letters,
            rationale.into(),
            is_multi_select,
            None,
        ))
    }

    /// Internal constructor for callers that already uphold the invariants.
    pub(crate) fn assemble(
        id: QuestionId,
        stem: String,
        options: Vec<QuestionOption>,
        correct_letters: BTreeSet<Letter>,
        rationale: String,
        is_multi_select: bool,
        category: Option<CategoryName>,
    ) -> Self {
        Self {
            id,
            stem,
            options,
            correct_letters,
            rationale,
            is_multi_select,
            category,
        }
    }

    /// Re-key the question, e.g. to keep ids unique when pooling several banks.
    #[must_use]
    pub fn with_id(mut self, id: QuestionId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: CategoryName) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    #[must_use]
    pub fn options(&self) -> &[QuestionOption] {
        &self.options
    }

    #[must_use]
    pub fn correct_letters(&self) -> &BTreeSet<Letter> {
        &self.correct_letters
    }

    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    #[must_use]
    pub fn is_multi_select(&self) -> bool {
        self.is_multi_select
    }

    #[must_use]
    pub fn category(&self) -> Option<&CategoryName> {
        self.category.as_ref()
    }

    /// A question worth serving: at least two options and a known answer.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.options.len() >= 2 && !self.correct_letters.is_empty()
    }

    /// Exact-set comparison of the selection against the correct letters.
    #[must_use]
    pub fn grade(&self, selected: &[Letter]) -> bool {
        let selected: BTreeSet<Letter> = selected.iter().copied().collect();
        selected == self.correct_letters
    }
}

//
// ─── BANK ──────────────────────────────────────────────────────────────────────
//

/// Ordered, immutable set of canonical questions for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBank {
    module_id: ModuleId,
    questions: Vec<Question>,
    index: HashMap<QuestionId, usize>,
}

impl QuestionBank {
    #[must_use]
    pub fn new(module_id: ModuleId, questions: Vec<Question>) -> Self {
        let mut index = HashMap::with_capacity(questions.len());
        for (i, q) in questions.iter().enumerate() {
            index.entry(q.id().clone()).or_insert(i);
        }
        Self {
            module_id,
            questions,
            index,
        }
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&Question> {
        self.index.get(id).map(|i| &self.questions[*i])
    }

    /// Questions that pass `Question::is_usable`, in bank order.
    #[must_use]
    pub fn usable(&self) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.is_usable()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(s: &str) -> BTreeSet<Letter> {
        s.chars().filter_map(Letter::from_char).collect()
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("opt {i}")).collect()
    }

    #[test]
    fn letter_bounds() {
        assert_eq!(Letter::from_index(0).unwrap().as_char(), 'A');
        assert_eq!(Letter::from_index(7).unwrap().as_char(), 'H');
        assert!(Letter::from_index(8).is_none());
        assert_eq!(Letter::from_char('c').unwrap().index(), 2);
        assert!(Letter::from_char('I').is_none());
        assert!("AB".parse::<Letter>().is_err());
    }

    #[test]
    fn letter_serializes_as_text() {
        let json = serde_json::to_string(&Letter::from_char('D').unwrap()).unwrap();
        assert_eq!(json, "\"D\"");
        let back: Letter = serde_json::from_str("\"d\"").unwrap();
        assert_eq!(back.as_char(), 'D');
    }

    #[test]
    fn new_assigns_letters_in_order() {
        let q = Question::new(QuestionId::new("x"), "Stem", texts(3), letters("B"), "", false)
            .unwrap();
        let assigned: String = q.options().iter().map(|o| o.letter.as_char()).collect();
        assert_eq!(assigned, "ABC");
        assert!(q.is_usable());
    }

    #[test]
    fn new_rejects_correct_letter_without_option() {
        let err = Question::new(QuestionId::new("x"), "Stem", texts(2), letters("C"), "", false)
            .unwrap_err();
        assert_eq!(err, QuestionError::UnknownCorrectLetter(Letter::from_char('C').unwrap()));
    }

    #[test]
    fn new_rejects_multiple_correct_for_single_answer() {
        let err = Question::new(QuestionId::new("x"), "Stem", texts(3), letters("AB"), "", false)
            .unwrap_err();
        assert_eq!(err, QuestionError::MultipleCorrect(2));
    }

    #[test]
    fn grade_requires_exact_set() {
        let q = Question::new(QuestionId::new("x"), "Stem", texts(4), letters("AC"), "", true)
            .unwrap();
        assert!(q.grade(&[Letter::from_char('C').unwrap(), Letter::from_char('A').unwrap()]));
        assert!(!q.grade(&[Letter::from_char('A').unwrap()]));
        assert!(!q.grade(&[
            Letter::from_char('A').unwrap(),
            Letter::from_char('B').unwrap(),
            Letter::from_char('C').unwrap(),
        ]));
    }

    #[test]
    fn stored_question_round_trips() {
        let q = Question::new(QuestionId::new("x"), "Stem", texts(3), letters("AC"), "why", true)
            .unwrap()
            .with_category(CategoryName::new("Labs").unwrap());
        let json = serde_json::to_string(&q).unwrap();
        let back: Question = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn stored_question_is_checked_on_load() {
        let mut value = serde_json::to_value(
            Question::new(QuestionId::new("x"), "Stem", texts(2), letters("A"), "", false)
                .unwrap(),
        )
        .unwrap();

        value["correct_letters"] = serde_json::json!(["D"]);
        assert!(serde_json::from_value::<Question>(value.clone()).is_err());

        value["correct_letters"] = serde_json::json!(["A", "B"]);
        assert!(serde_json::from_value::<Question>(value.clone()).is_err());

        value["correct_letters"] = serde_json::json!(["A"]);
        value["options"][1]["letter"] = serde_json::json!("E");
        assert!(serde_json::from_value::<Question>(value).is_err());
    }

    #[test]
    fn bank_lookup_and_usable_filter() {
        let good = Question::new(QuestionId::new("a"), "S", texts(2), letters("A"), "", false)
            .unwrap();
        let thin = Question::new(QuestionId::new("b"), "S", texts(1), letters("A"), "", false)
            .unwrap();
        let bank = QuestionBank::new(ModuleId::new("m").unwrap(), vec![good, thin]);
        assert_eq!(bank.len(), 2);
        assert_eq!(bank.usable().len(), 1);
        assert!(bank.get(&QuestionId::new("b")).is_some());
        assert!(bank.get(&QuestionId::new("zz")).is_none());
    }
}
