//! Relative paths of everything written for one survey:
//!
//! ```text
//! <brand>/<survey>/<survey>.csv
//! <brand>/<survey>/raw.json
//! <brand>/<survey>/images/<column>/<group key>.<ext>
//! ```

/// Makes a value safe to use as one path component.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else if cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len())
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct SurveyLayout {
    survey_dir: String,
    survey_name: String,
}

impl SurveyLayout {
    pub fn new(brand_dir: &str, survey_name: &str) -> Self {
        let survey_name = sanitize_segment(survey_name);
        Self {
            survey_dir: format!("{}/{}", sanitize_segment(brand_dir), survey_name),
            survey_name,
        }
    }

    pub fn csv_path(&self) -> String {
        format!("{}/{}.csv", self.survey_dir, self.survey_name)
    }

    pub fn raw_json_path(&self) -> String {
        format!("{}/raw.json", self.survey_dir)
    }

    pub fn image_path(&self, column: &str, file_stem: &str, extension: &str) -> String {
        format!(
            "{}/images/{}/{}.{}",
            self.survey_dir,
            sanitize_segment(column),
            sanitize_segment(file_stem),
            sanitize_segment(extension)
        )
    }
}
