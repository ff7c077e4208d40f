use crate::config::{AppConfig, CACHE_DIR_NAME};
use crate::domain::model::AccessScope;
use crate::utils::error::{Result, SurveyError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[cfg(windows)]
pub const SURVEY_ID_DELIMITER: char = ';';
#[cfg(not(windows))]
pub const SURVEY_ID_DELIMITER: char = ':';

#[derive(Debug, Clone, Parser)]
#[command(name = "survey-etl")]
#[command(about = "Download Pavlovia surveys as CSV files and images", version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Pavlovia username (email)
    #[arg(short, long)]
    pub username: String,

    /// Pavlovia password
    #[arg(short, long)]
    pub password: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List all users
    ListUsers,

    /// Add a user
    AddUser {
        #[command(flatten)]
        login: LoginArgs,

        /// Replace the stored token if the user already exists
        #[arg(long)]
        force: bool,
    },

    /// Update a user's access token
    UpdateUser {
        #[command(flatten)]
        login: LoginArgs,
    },

    /// Remove a user's login details
    RemoveUser { user: String },

    /// Remove all users
    RemoveAllUsers,

    /// List all surveys for a user
    ListSurveys {
        /// Full Pavlovia username (email)
        user: String,

        #[arg(long = "access-rights", value_enum, default_value_t = AccessScope::Both)]
        access_rights: AccessScope,
    },

    /// Download surveys for a user (all available surveys when --surveys is omitted)
    GetSurveys {
        /// Full Pavlovia username (email)
        user: String,

        /// Survey ids separated by ':' (';' on Windows)
        #[arg(short, long, value_delimiter = SURVEY_ID_DELIMITER)]
        surveys: Option<Vec<String>>,

        /// Directory to save the surveys in
        #[arg(long)]
        path: Option<String>,

        /// Also save each survey's raw JSON
        #[arg(long)]
        raw_json: bool,
    },
}

impl Cli {
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Command::GetSurveys { path, raw_json, .. } = &self.command {
            if let Some(path) = path {
                config.export.output_root = path.clone();
            }
            if *raw_json {
                config.export.save_raw_json = true;
            }
        }

        if config.cache.dir.is_none() {
            config.cache.dir = Some(default_cache_dir()?);
        }

        Ok(config)
    }
}

/// `%APPDATA%` on Windows, `$HOME` elsewhere, plus the cache directory name.
pub fn default_cache_dir() -> Result<PathBuf> {
    let var = if cfg!(windows) { "APPDATA" } else { "HOME" };
    std::env::var_os(var)
        .map(|base| PathBuf::from(base).join(CACHE_DIR_NAME))
        .ok_or_else(|| SurveyError::MissingConfigError {
            field: format!("cache.dir (${} is not set)", var),
        })
}
