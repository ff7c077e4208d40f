#[cfg(feature = "cli")]
pub mod cli;

use crate::domain::model::DuplicateKeyPolicy;
use crate::utils::error::{Result, SurveyError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://pavlovia.org/api/v2";
pub const DEFAULT_OAUTH_URL: &str = "https://gitlab.pavlovia.org/oauth/token?scope=read_user";
pub const DEFAULT_REFERER: &str = "https://pavlovia.org/dashboard?tab=0";
pub const DEFAULT_BRAND_DIR: &str = "pavlovia-survey-utils";
pub const DEFAULT_GROUPING_KEY: &str = "sessionToken";
pub const CACHE_DIR_NAME: &str = ".pavlovia_survey_utils";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub oauth_url: String,
    pub referer: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            referer: Some(DEFAULT_REFERER.to_string()),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the user registry. Resolved by the caller when unset.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_root: String,
    pub brand_dir: String,
    pub grouping_key: String,
    pub save_images: bool,
    pub save_raw_json: bool,
    pub duplicate_key_policy: DuplicateKeyPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_root: ".".to_string(),
            brand_dir: DEFAULT_BRAND_DIR.to_string(),
            grouping_key: DEFAULT_GROUPING_KEY.to_string(),
            save_images: true,
            save_raw_json: false,
            duplicate_key_policy: DuplicateKeyPolicy::KeepFirst,
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SurveyError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SurveyError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SurveyError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url("api.base_url", &self.api.base_url)?;
        validation::validate_url("api.oauth_url", &self.api.oauth_url)?;

        if let Some(referer) = &self.api.referer {
            validation::validate_url("api.referer", referer)?;
        }

        if let Some(dir) = &self.cache.dir {
            validation::validate_path("cache.dir", &dir.to_string_lossy())?;
        }

        validation::validate_path("export.output_root", &self.export.output_root)?;
        validation::validate_path_segment("export.brand_dir", &self.export.brand_dir)?;
        validation::validate_non_empty_string("export.grouping_key", &self.export.grouping_key)?;

        Ok(())
    }
}
