pub mod detector;
pub mod export;
pub mod extractor;
pub mod layout;
pub mod normalizer;
pub mod orchestrator;

pub use crate::domain::model::{NormalizedTable, RawSurveyPayload};
pub use crate::domain::ports::{Storage, SurveySource};
pub use crate::utils::error::Result;
