use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurveyError {
    #[error("Authorization failed (HTTP {status}): {message}")]
    AuthError { status: u16, message: String },

    #[error("Request failed{}: {message}", status_suffix(.status))]
    TransportError { status: Option<u16>, message: String },

    #[error("Malformed survey payload: {message}")]
    SchemaError { message: String },

    #[error("Cannot decode embedded binary in column '{column}' for '{group_key}': {reason}")]
    DecodeError {
        column: String,
        group_key: String,
        reason: String,
    },

    #[error("User '{username}' not found in credential cache")]
    NotFound { username: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },
}

impl From<reqwest::Error> for SurveyError {
    fn from(err: reqwest::Error) -> Self {
        SurveyError::TransportError {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl SurveyError {
    pub fn schema(message: impl Into<String>) -> Self {
        SurveyError::SchemaError {
            message: message.into(),
        }
    }

    /// Only an authorization failure stops a multi-survey batch; everything
    /// else is handled per survey.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, SurveyError::AuthError { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SurveyError::AuthError { .. } => {
                "Refresh the stored token with `update-user` and try again"
            }
            SurveyError::TransportError { .. } => {
                "Check the network connection and the configured API base URL"
            }
            SurveyError::SchemaError { .. } => {
                "The server returned an unexpected survey shape; save it with --raw-json and inspect it"
            }
            SurveyError::DecodeError { .. } => {
                "The embedded file is corrupt on the server side; other files were still written"
            }
            SurveyError::NotFound { .. } => "Register the user first with `add-user`",
            SurveyError::CsvError(_) | SurveyError::IoError(_) => {
                "Check that the output directory is writable"
            }
            SurveyError::SerializationError(_) => {
                "The credential cache may be corrupt; run `remove-all-users` and register again"
            }
            SurveyError::ConfigError { .. }
            | SurveyError::ConfigValidationError { .. }
            | SurveyError::InvalidConfigValueError { .. }
            | SurveyError::MissingConfigError { .. } => "Fix the configuration file and retry",
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, SurveyError>;
