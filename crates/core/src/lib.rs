#![forbid(unsafe_code)]

pub mod model;
pub mod normalize;
pub mod sources;

pub use normalize::{MalformedRecord, Normalized, RecordIssue, normalize, normalize_with_report};
pub use sources::{Clock, RandomSource};
