mod category;
mod count;
mod ids;
mod question;
mod session;
mod settings;

pub use category::{
    CatalogEntry, CategoryError, CategoryName, CategoryWeightTable, UNCATEGORIZED,
};
pub use count::{CountParseError, QuestionCount};
pub use ids::{ModuleId, ParseIdError, QuestionId, SessionKey, WEIGHTED_MODULE};
pub use question::{Letter, MAX_OPTIONS, Question, QuestionBank, QuestionError, QuestionOption};
pub use session::{AnswerRecord, DrawMemory, SessionRecord, SessionState, SessionStateError};
pub use settings::{QuizSettings, SettingsError};
