pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;

pub use adapters::credentials::{AddUserOutcome, JsonCredentialStore};
pub use adapters::http::PavloviaGateway;
pub use adapters::storage::LocalStorage;
pub use config::AppConfig;
pub use core::orchestrator::SurveyDownloader;
pub use domain::model::{AccessScope, FetchReport, FetchWarning};
pub use utils::error::{Result, SurveyError};
