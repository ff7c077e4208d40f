use crate::config::ExportConfig;
use crate::core::detector::detect_binary_columns;
use crate::core::export::render_csv;
use crate::core::extractor::BinaryExtractor;
use crate::core::layout::SurveyLayout;
use crate::core::normalizer::normalize;
use crate::domain::model::{
    AccessScope, ExportSummary, FetchReport, FetchWarning, RawSurveyPayload,
};
use crate::domain::ports::{Storage, SurveySource};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::fmt;

/// Stages a survey moves through during a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    ResolvingIds,
    Fetching,
    Normalizing,
    Extracting,
    Exporting,
    Done,
    Skipped,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStage::ResolvingIds => "RESOLVING_IDS",
            FetchStage::Fetching => "FETCHING",
            FetchStage::Normalizing => "NORMALIZING",
            FetchStage::Extracting => "EXTRACTING",
            FetchStage::Exporting => "EXPORTING",
            FetchStage::Done => "DONE",
            FetchStage::Skipped => "SKIPPED",
        };
        f.write_str(name)
    }
}

/// How one survey ended.
#[derive(Debug)]
pub enum SurveyOutcome {
    Exported(ExportSummary),
    Skipped(FetchWarning),
}

/// Drives fetch, normalize, extract and export for a batch of surveys.
pub struct SurveyDownloader<G: SurveySource, S: Storage> {
    gateway: G,
    storage: S,
    options: ExportConfig,
}

impl<G: SurveySource, S: Storage> SurveyDownloader<G, S> {
    pub fn new(gateway: G, storage: S, options: ExportConfig) -> Self {
        Self {
            gateway,
            storage,
            options,
        }
    }

    /// Downloads the given surveys, or every survey the token can see.
    ///
    /// Per-survey failures become warnings in the report. Only a failure to
    /// list the available surveys (e.g. a rejected token) is returned as an error.
    pub async fn download_surveys(
        &self,
        token: &str,
        survey_ids: Option<&[String]>,
    ) -> Result<FetchReport> {
        let ids = match survey_ids {
            Some(ids) => ids.to_vec(),
            None => {
                tracing::debug!("[{}] listing all available surveys", FetchStage::ResolvingIds);
                self.gateway
                    .list_available(token, AccessScope::Both)
                    .await?
                    .into_keys()
                    .collect()
            }
        };

        tracing::info!("🚀 Downloading {} survey(s)", ids.len());
        let mut report = FetchReport::default();
        // csv path -> survey id that wrote it
        let mut exported_to: HashMap<String, String> = HashMap::new();

        for survey_id in &ids {
            match self.process_survey(survey_id, token, &mut report.warnings).await {
                Ok(SurveyOutcome::Exported(summary)) => {
                    if let Some(previous) =
                        exported_to.insert(summary.csv_path.clone(), survey_id.clone())
                    {
                        let warning = FetchWarning::SurveyOverwritten {
                            survey_id: survey_id.clone(),
                            previous_survey_id: previous,
                            csv_path: summary.csv_path.clone(),
                        };
                        tracing::warn!("{}", warning);
                        report.warnings.push(warning);
                    }
                    tracing::info!(
                        "✅ [{}] {} -> {}",
                        FetchStage::Done,
                        summary.survey_name,
                        summary.csv_path
                    );
                    report.exported.push(summary);
                }
                Ok(SurveyOutcome::Skipped(warning)) => {
                    tracing::warn!("[{}] {}", FetchStage::Skipped, warning);
                    report.skipped.push(survey_id.clone());
                    report.warnings.push(warning);
                }
                Err(e) if e.is_batch_fatal() => return Err(e),
                Err(e) => {
                    let warning = FetchWarning::SurveyFailed {
                        survey_id: survey_id.clone(),
                        error: e.to_string(),
                    };
                    tracing::warn!("[{}] {} ({})", FetchStage::Skipped, warning, e.recovery_suggestion());
                    report.skipped.push(survey_id.clone());
                    report.warnings.push(warning);
                }
            }
        }

        Ok(report)
    }

    /// Runs one survey end to end. Warnings that do not stop the survey are
    /// appended to `warnings`.
    pub async fn process_survey(
        &self,
        survey_id: &str,
        token: &str,
        warnings: &mut Vec<FetchWarning>,
    ) -> Result<SurveyOutcome> {
        tracing::debug!("[{}] {}", FetchStage::Fetching, survey_id);
        let payload = self.gateway.fetch_survey(survey_id, token).await?;
        if payload.is_empty() {
            return Ok(SurveyOutcome::Skipped(FetchWarning::EmptyPayload {
                survey_id: survey_id.to_string(),
            }));
        }

        tracing::debug!("[{}] {}", FetchStage::Normalizing, survey_id);
        let table = normalize(&payload)?;
        let survey_name = payload.survey_name().unwrap_or(survey_id).to_string();

        if table.is_empty() {
            return Ok(SurveyOutcome::Skipped(FetchWarning::NoResponses {
                survey_id: survey_id.to_string(),
                survey_name,
            }));
        }

        tracing::debug!("[{}] {}", FetchStage::Extracting, survey_name);
        let binary_columns = detect_binary_columns(&table);
        if !binary_columns.is_empty() {
            tracing::debug!("{}: binary columns {:?}", survey_name, binary_columns);
        }
        let rows = table.row_count();
        let extraction = BinaryExtractor::new(&self.storage, &self.options)
            .extract(table, &binary_columns, &survey_name)
            .await?;
        warnings.extend(extraction.warnings);

        tracing::debug!("[{}] {}", FetchStage::Exporting, survey_name);
        let layout = SurveyLayout::new(&self.options.brand_dir, &survey_name);
        let csv_path = layout.csv_path();
        self.storage
            .write_file(&csv_path, &render_csv(&extraction.table)?)
            .await?;

        let raw_json_path = if self.options.save_raw_json {
            Some(self.write_raw_json(&layout, &payload).await?)
        } else {
            None
        };

        Ok(SurveyOutcome::Exported(ExportSummary {
            survey_id: survey_id.to_string(),
            survey_name,
            csv_path,
            rows,
            columns: extraction.table.columns().len(),
            image_files: extraction.written,
            raw_json_path,
        }))
    }

    async fn write_raw_json(&self, layout: &SurveyLayout, payload: &RawSurveyPayload) -> Result<String> {
        let path = layout.raw_json_path();
        let json = serde_json::to_vec_pretty(payload)?;
        self.storage.write_file(&path, &json).await?;
        Ok(path)
    }
}
