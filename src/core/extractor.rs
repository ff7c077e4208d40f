use crate::config::ExportConfig;
use crate::core::layout::SurveyLayout;
use crate::domain::model::{DuplicateKeyPolicy, FetchWarning, NormalizedTable};
use crate::domain::ports::Storage;
use crate::utils::error::{Result, SurveyError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

const BASE64_MARKER: &str = "base64,";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataUriError {
    #[error("no 'base64,' marker")]
    MissingBase64Marker,
    #[error("no MIME subtype to use as file extension")]
    MissingSubtype,
    #[error("invalid base64 payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBinary {
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Decodes `data:<type>/<subtype>[;...];base64,<payload>`; the subtype becomes the extension.
pub fn decode_data_uri(value: &str) -> std::result::Result<DecodedBinary, DataUriError> {
    let (header, payload) = value
        .split_once(BASE64_MARKER)
        .ok_or(DataUriError::MissingBase64Marker)?;

    let mime = header.split(';').next().unwrap_or_default();
    let extension = mime
        .split_once('/')
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty())
        .ok_or(DataUriError::MissingSubtype)?;

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DataUriError::InvalidPayload(e.to_string()))?;

    Ok(DecodedBinary {
        extension: extension.to_string(),
        bytes,
    })
}

/// One file to write once every group has passed the duplicate-key policy.
struct PlannedFile<'t> {
    column: &'t str,
    group_key: String,
    file_stem: String,
    value: &'t str,
}

/// Output of one extraction: the table to export plus what happened on disk.
#[derive(Debug)]
pub struct Extraction {
    pub table: NormalizedTable,
    pub written: Vec<String>,
    pub warnings: Vec<FetchWarning>,
}

fn group_key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Writes the embedded files of the binary columns and drops those columns.
pub struct BinaryExtractor<'a, S: Storage> {
    storage: &'a S,
    options: &'a ExportConfig,
}

impl<'a, S: Storage> BinaryExtractor<'a, S> {
    pub fn new(storage: &'a S, options: &'a ExportConfig) -> Self {
        Self { storage, options }
    }

    pub async fn extract(
        &self,
        table: NormalizedTable,
        binary_columns: &[String],
        survey_name: &str,
    ) -> Result<Extraction> {
        let mut extraction = Extraction {
            table: table.without_columns(binary_columns),
            written: Vec::new(),
            warnings: Vec::new(),
        };

        if binary_columns.is_empty() || !self.options.save_images {
            return Ok(extraction);
        }

        let key_column = &self.options.grouping_key;
        let key_idx = table.column_index(key_column).ok_or_else(|| {
            SurveyError::schema(format!(
                "{} has image columns but no '{}' column to name the files by",
                survey_name, key_column
            ))
        })?;

        // Resolve every group before writing, so a rejected survey leaves no files behind.
        let mut planned: Vec<PlannedFile<'_>> = Vec::new();
        for column in binary_columns {
            let Some(col_idx) = table.column_index(column) else {
                continue;
            };

            // group key -> non-empty cell values, in row order
            let mut groups: IndexMap<String, Vec<&str>> = IndexMap::new();
            for (row_idx, row) in table.rows().iter().enumerate() {
                let Some(cell) = row[col_idx].as_str().filter(|s| !s.is_empty()) else {
                    continue;
                };
                match group_key_of(&row[key_idx]) {
                    Some(key) => groups.entry(key).or_default().push(cell),
                    None => {
                        let warning = FetchWarning::MissingGroupKey {
                            survey_name: survey_name.to_string(),
                            column: column.clone(),
                            row: row_idx,
                        };
                        tracing::warn!("{}", warning);
                        extraction.warnings.push(warning);
                    }
                }
            }

            for (key, values) in &groups {
                for (file_stem, value) in self.select(survey_name, column, key, values, &mut extraction)? {
                    planned.push(PlannedFile {
                        column,
                        group_key: key.clone(),
                        file_stem,
                        value,
                    });
                }
            }
        }

        let layout = SurveyLayout::new(&self.options.brand_dir, survey_name);
        let mut taken: HashSet<String> = HashSet::new();
        for file in &planned {
            self.write_one(&layout, survey_name, file, &mut taken, &mut extraction)
                .await?;
        }

        tracing::info!(
            "🖼️ {}: wrote {} file(s) from {} column(s)",
            survey_name,
            extraction.written.len(),
            binary_columns.len()
        );
        Ok(extraction)
    }

    /// Applies the duplicate-key policy to one group; returns (file stem, value) pairs.
    fn select<'v>(
        &self,
        survey_name: &str,
        column: &str,
        key: &str,
        values: &[&'v str],
        extraction: &mut Extraction,
    ) -> Result<Vec<(String, &'v str)>> {
        if values.len() <= 1 {
            return Ok(values.iter().map(|v| (key.to_string(), *v)).collect());
        }

        match self.options.duplicate_key_policy {
            DuplicateKeyPolicy::KeepFirst => {
                let warning = FetchWarning::DuplicateGroupKey {
                    survey_name: survey_name.to_string(),
                    column: column.to_string(),
                    group_key: key.to_string(),
                    dropped: values.len() - 1,
                };
                tracing::warn!("{}", warning);
                extraction.warnings.push(warning);
                Ok(vec![(key.to_string(), values[0])])
            }
            DuplicateKeyPolicy::Suffix => Ok(values
                .iter()
                .enumerate()
                .map(|(n, v)| match n {
                    0 => (key.to_string(), *v),
                    n => (format!("{}_{}", key, n), *v),
                })
                .collect()),
            DuplicateKeyPolicy::Fail => Err(SurveyError::schema(format!(
                "{}: grouping key '{}' is not unique ({} values in column '{}')",
                survey_name,
                key,
                values.len(),
                column
            ))),
        }
    }

    /// Decodes one value and writes it. A path already used in this extraction
    /// gets a numeric suffix instead of being overwritten.
    async fn write_one(
        &self,
        layout: &SurveyLayout,
        survey_name: &str,
        file: &PlannedFile<'_>,
        taken: &mut HashSet<String>,
        extraction: &mut Extraction,
    ) -> Result<()> {
        let decoded = match decode_data_uri(file.value) {
            Ok(decoded) => decoded,
            Err(e) => {
                let error = SurveyError::DecodeError {
                    column: file.column.to_string(),
                    group_key: file.group_key.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!("{}: {}", survey_name, error);
                extraction.warnings.push(FetchWarning::Decode {
                    survey_name: survey_name.to_string(),
                    column: file.column.to_string(),
                    group_key: file.group_key.clone(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        let mut path = layout.image_path(file.column, &file.file_stem, &decoded.extension);
        if taken.contains(&path) {
            let wanted = path;
            path = (1usize..)
                .map(|n| {
                    let stem = format!("{}_{}", file.file_stem, n);
                    layout.image_path(file.column, &stem, &decoded.extension)
                })
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_default();

            let warning = FetchWarning::RenamedImage {
                survey_name: survey_name.to_string(),
                column: file.column.to_string(),
                group_key: file.group_key.clone(),
                wanted,
                written: path.clone(),
            };
            tracing::warn!("{}", warning);
            extraction.warnings.push(warning);
        }

        tracing::debug!("Writing {} ({} bytes)", path, decoded.bytes.len());
        self.storage.write_file(&path, &decoded.bytes).await?;
        taken.insert(path.clone());
        extraction.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::memory::MemoryStorage;
    use crate::domain::model::{Column, ColumnOrigin};
    use serde_json::json;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-png";

    fn data_uri(mime: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
    }

    fn table(rows: Vec<Vec<Value>>) -> NormalizedTable {
        let columns = ["sessionToken", "photo", "age"]
            .iter()
            .map(|n| Column {
                name: n.to_string(),
                origin: ColumnOrigin::Answer,
            })
            .collect();
        NormalizedTable::new(columns, rows)
    }

    fn photo() -> Vec<String> {
        vec!["photo".to_string()]
    }

    #[test]
    fn test_decode_data_uri() {
        let decoded = decode_data_uri(&data_uri("image/png", PNG_BYTES)).unwrap();
        assert_eq!(decoded.extension, "png");
        assert_eq!(decoded.bytes, PNG_BYTES);

        let jpeg = decode_data_uri("data:image/jpeg;charset=utf-8;base64,/9j/\n4A==").unwrap();
        assert_eq!(jpeg.extension, "jpeg");
        assert_eq!(jpeg.bytes, vec![0xff, 0xd8, 0xff, 0xe0]);
    }

    #[test]
    fn test_decode_data_uri_errors() {
        assert_eq!(
            decode_data_uri("data:image/png;AAAA"),
            Err(DataUriError::MissingBase64Marker)
        );
        assert_eq!(
            decode_data_uri("data:image;base64,AAAA"),
            Err(DataUriError::MissingSubtype)
        );
        assert!(matches!(
            decode_data_uri("data:image/png;base64,%%%"),
            Err(DataUriError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_writes_one_file_per_key_and_drops_column() {
        let storage = MemoryStorage::new();
        let options = ExportConfig::default();
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), json!(data_uri("image/png", PNG_BYTES)), json!(30)],
            vec![json!("s2"), json!(data_uri("image/png", b"second")), json!(41)],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(
            extraction.table.column_names().collect::<Vec<_>>(),
            vec!["sessionToken", "age"]
        );
        assert_eq!(
            storage.paths().await,
            vec![
                "pavlovia-survey-utils/Mood/images/photo/s1.png",
                "pavlovia-survey-utils/Mood/images/photo/s2.png",
            ]
        );
        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/s1.png").await.unwrap(),
            PNG_BYTES
        );
        assert!(extraction.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_value_is_skipped_not_fatal() {
        let storage = MemoryStorage::new();
        let options = ExportConfig::default();
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), json!("data:image/png;no-marker"), Value::Null],
            vec![json!("s2"), json!(data_uri("image/png", PNG_BYTES)), Value::Null],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(extraction.written, vec!["pavlovia-survey-utils/Mood/images/photo/s2.png"]);
        assert_eq!(extraction.warnings.len(), 1);
        assert!(matches!(
            &extraction.warnings[0],
            FetchWarning::Decode { group_key, .. } if group_key == "s1"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_keys_keep_first_with_warning() {
        let storage = MemoryStorage::new();
        let options = ExportConfig::default();
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), json!(data_uri("image/png", b"first")), Value::Null],
            vec![json!("s1"), json!(data_uri("image/png", b"second")), Value::Null],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/s1.png").await.unwrap(),
            b"first"
        );
        assert_eq!(extraction.written.len(), 1);
        assert!(matches!(
            &extraction.warnings[0],
            FetchWarning::DuplicateGroupKey { dropped: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_keys_suffix_policy_keeps_all() {
        let storage = MemoryStorage::new();
        let options = ExportConfig {
            duplicate_key_policy: DuplicateKeyPolicy::Suffix,
            ..ExportConfig::default()
        };
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), json!(data_uri("image/png", b"first")), Value::Null],
            vec![json!("s1"), json!(data_uri("image/gif", b"second")), Value::Null],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(
            extraction.written,
            vec![
                "pavlovia-survey-utils/Mood/images/photo/s1.png",
                "pavlovia-survey-utils/Mood/images/photo/s1_1.gif",
            ]
        );
        assert!(extraction.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_keys_fail_policy() {
        let storage = MemoryStorage::new();
        let options = ExportConfig {
            duplicate_key_policy: DuplicateKeyPolicy::Fail,
            ..ExportConfig::default()
        };
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), json!(data_uri("image/png", b"first")), Value::Null],
            vec![json!("s1"), json!(data_uri("image/png", b"second")), Value::Null],
        ]);

        let result = extractor.extract(t, &photo(), "Mood").await;
        assert!(matches!(result, Err(SurveyError::SchemaError { .. })));
    }

    #[tokio::test]
    async fn test_fail_policy_writes_nothing() {
        let storage = MemoryStorage::new();
        let options = ExportConfig {
            duplicate_key_policy: DuplicateKeyPolicy::Fail,
            ..ExportConfig::default()
        };
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s0"), json!(data_uri("image/png", b"zero")), Value::Null],
            vec![json!("s1"), json!(data_uri("image/png", b"first")), Value::Null],
            vec![json!("s1"), json!(data_uri("image/png", b"second")), Value::Null],
        ]);

        let result = extractor.extract(t, &photo(), "Mood").await;
        assert!(matches!(result, Err(SurveyError::SchemaError { .. })));
        assert!(storage.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_keys_equal_after_sanitizing_get_distinct_files() {
        let storage = MemoryStorage::new();
        let options = ExportConfig::default();
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("a/b"), json!(data_uri("image/png", b"first")), Value::Null],
            vec![json!("a_b"), json!(data_uri("image/png", b"second")), Value::Null],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(
            extraction.written,
            vec![
                "pavlovia-survey-utils/Mood/images/photo/a_b.png",
                "pavlovia-survey-utils/Mood/images/photo/a_b_1.png",
            ]
        );
        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/a_b.png").await.unwrap(),
            b"first"
        );
        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/a_b_1.png").await.unwrap(),
            b"second"
        );
        assert!(matches!(
            extraction.warnings.as_slice(),
            [FetchWarning::RenamedImage { group_key, .. }] if group_key == "a_b"
        ));
    }

    #[tokio::test]
    async fn test_suffixed_names_do_not_replace_real_keys() {
        let storage = MemoryStorage::new();
        let options = ExportConfig {
            duplicate_key_policy: DuplicateKeyPolicy::Suffix,
            ..ExportConfig::default()
        };
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), json!(data_uri("image/png", b"one")), Value::Null],
            vec![json!("s1"), json!(data_uri("image/png", b"two")), Value::Null],
            vec![json!("s1_1"), json!(data_uri("image/png", b"three")), Value::Null],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(storage.paths().await.len(), 3);
        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/s1_1.png").await.unwrap(),
            b"two"
        );
        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/s1_1_1.png").await.unwrap(),
            b"three"
        );
        assert_eq!(extraction.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_first_non_null_value_per_group_and_missing_keys() {
        let storage = MemoryStorage::new();
        let options = ExportConfig::default();
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![
            vec![json!("s1"), Value::Null, Value::Null],
            vec![json!("s1"), json!(data_uri("image/png", b"late")), Value::Null],
            vec![Value::Null, json!(data_uri("image/png", b"orphan")), Value::Null],
        ]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert_eq!(
            storage.get_file("pavlovia-survey-utils/Mood/images/photo/s1.png").await.unwrap(),
            b"late"
        );
        assert_eq!(
            extraction.warnings,
            vec![FetchWarning::MissingGroupKey {
                survey_name: "Mood".to_string(),
                column: "photo".to_string(),
                row: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_grouping_column_is_schema_error() {
        let storage = MemoryStorage::new();
        let options = ExportConfig {
            grouping_key: "participant".to_string(),
            ..ExportConfig::default()
        };
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![vec![json!("s1"), json!(data_uri("image/png", PNG_BYTES)), Value::Null]]);

        let result = extractor.extract(t, &photo(), "Mood").await;
        assert!(matches!(result, Err(SurveyError::SchemaError { .. })));
        assert!(storage.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_images_disabled_only_drops_columns() {
        let storage = MemoryStorage::new();
        let options = ExportConfig {
            save_images: false,
            ..ExportConfig::default()
        };
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![vec![json!("s1"), json!(data_uri("image/png", PNG_BYTES)), json!(5)]]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();

        assert!(extraction.written.is_empty());
        assert!(storage.paths().await.is_empty());
        assert_eq!(extraction.table.column_names().count(), 2);
    }

    #[tokio::test]
    async fn test_numeric_group_keys_name_files() {
        let storage = MemoryStorage::new();
        let options = ExportConfig::default();
        let extractor = BinaryExtractor::new(&storage, &options);

        let t = table(vec![vec![json!(17), json!(data_uri("image/png", PNG_BYTES)), Value::Null]]);

        let extraction = extractor.extract(t, &photo(), "Mood").await.unwrap();
        assert_eq!(extraction.written, vec!["pavlovia-survey-utils/Mood/images/photo/17.png"]);
    }
}
