use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const SURVEY_NAME_FIELD: &str = "surveyName";
pub const SURVEY_RESPONSE_FIELD: &str = "surveyResponse";

/// One survey as the platform returns it: metadata plus the raw response records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSurveyPayload {
    #[serde(rename = "survey", default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub responses: Vec<Value>,
}

impl RawSurveyPayload {
    /// The "no data" sentinel handed back when a fetch fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.responses.is_empty()
    }

    pub fn survey_name(&self) -> Option<&str> {
        self.metadata.get(SURVEY_NAME_FIELD).and_then(Value::as_str)
    }
}

/// Where a column of the normalized table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrigin {
    /// Per-respondent field present on the response record itself.
    Fixed,
    /// Key of the nested instrument answer mapping.
    Answer,
    /// Value copied onto every row from the survey metadata.
    Injected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub origin: ColumnOrigin,
}

/// Flat, column-ordered table: one row per response record, missing cells are `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl NormalizedTable {
    /// Rows must already be aligned with `columns`; short rows are padded with nulls.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// All cells of one column, top to bottom.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Copy of the table without the named columns. Unknown names are ignored.
    pub fn without_columns(&self, names: &[String]) -> Self {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !names.contains(&c.name))
            .map(|(i, _)| i)
            .collect();

        let columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Self { columns, rows }
    }
}

/// Which surveys a listing should include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum AccessScope {
    Owned,
    Shared,
    #[default]
    Both,
}

impl AccessScope {
    /// Value of the `accessRights` query parameter.
    pub fn as_query(&self) -> &'static str {
        match self {
            AccessScope::Owned => "owned",
            AccessScope::Shared => "shared",
            AccessScope::Both => "owned,shared",
        }
    }
}

/// What to do when several rows share one grouping key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Keep the first non-null value and report the rest as dropped.
    #[default]
    KeepFirst,
    /// Keep every value; later ones get `_<n>` appended to the file stem.
    Suffix,
    /// Treat a duplicate key as a malformed survey.
    Fail,
}

/// Non-fatal conditions collected while downloading a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchWarning {
    EmptyPayload {
        survey_id: String,
    },
    NoResponses {
        survey_id: String,
        survey_name: String,
    },
    Decode {
        survey_name: String,
        column: String,
        group_key: String,
        reason: String,
    },
    DuplicateGroupKey {
        survey_name: String,
        column: String,
        group_key: String,
        dropped: usize,
    },
    MissingGroupKey {
        survey_name: String,
        column: String,
        row: usize,
    },
    RenamedImage {
        survey_name: String,
        column: String,
        group_key: String,
        wanted: String,
        written: String,
    },
    SurveyOverwritten {
        survey_id: String,
        previous_survey_id: String,
        csv_path: String,
    },
    SurveyFailed {
        survey_id: String,
        error: String,
    },
}

impl fmt::Display for FetchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchWarning::EmptyPayload { survey_id } => {
                write!(f, "No data found for survey {}", survey_id)
            }
            FetchWarning::NoResponses {
                survey_id,
                survey_name,
            } => write!(
                f,
                "Survey {} ({}) has no responses, nothing exported",
                survey_name, survey_id
            ),
            FetchWarning::Decode {
                survey_name,
                column,
                group_key,
                reason,
            } => write!(
                f,
                "{}: skipped {}/{}: {}",
                survey_name, column, group_key, reason
            ),
            FetchWarning::DuplicateGroupKey {
                survey_name,
                column,
                group_key,
                dropped,
            } => write!(
                f,
                "{}: {} later value(s) of column '{}' for '{}' were not saved",
                survey_name, dropped, column, group_key
            ),
            FetchWarning::MissingGroupKey {
                survey_name,
                column,
                row,
            } => write!(
                f,
                "{}: row {} has no grouping key, its '{}' value was not saved",
                survey_name, row, column
            ),
            FetchWarning::RenamedImage {
                survey_name,
                column,
                group_key,
                wanted,
                written,
            } => write!(
                f,
                "{}: '{}' in column '{}' maps to {} which is already used, saved as {}",
                survey_name, group_key, column, wanted, written
            ),
            FetchWarning::SurveyOverwritten {
                survey_id,
                previous_survey_id,
                csv_path,
            } => write!(
                f,
                "Survey {} was exported to {}, replacing the files of survey {}",
                survey_id, csv_path, previous_survey_id
            ),
            FetchWarning::SurveyFailed { survey_id, error } => {
                write!(f, "Survey {} skipped: {}", survey_id, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub survey_id: String,
    pub survey_name: String,
    pub csv_path: String,
    pub rows: usize,
    pub columns: usize,
    pub image_files: Vec<String>,
    pub raw_json_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub exported: Vec<ExportSummary>,
    pub skipped: Vec<String>,
    pub warnings: Vec<FetchWarning>,
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for summary in &self.exported {
            writeln!(
                f,
                "* {} -> {} ({} rows, {} images)",
                summary.survey_name,
                summary.csv_path,
                summary.rows,
                summary.image_files.len()
            )?;
        }
        for warning in &self.warnings {
            writeln!(f, "! {}", warning)?;
        }
        Ok(())
    }
}

/// One registered user in the credential cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCredentialEntry {
    pub access_token: String,
    #[serde(rename = "registration_date", with = "registration_format")]
    pub registered_at: NaiveDateTime,
}

pub type CredentialRegistry = IndexMap<String, UserCredentialEntry>;

mod registration_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
