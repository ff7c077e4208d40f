//! Flattens a raw survey payload into one row per response record.
//!
//! Columns are the fixed per-respondent fields (first-seen order across
//! records), then the instrument answer keys (first-seen order), then the
//! injected survey name. When a fixed field and an answer key share a name
//! the fixed field wins for the whole column and the answer values are
//! discarded. The injected survey name overwrites any column of the same name
//! in place.

use crate::domain::model::{
    Column, ColumnOrigin, NormalizedTable, RawSurveyPayload, SURVEY_NAME_FIELD,
    SURVEY_RESPONSE_FIELD,
};
use crate::utils::error::{Result, SurveyError};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Ordered column set that remembers where each column came from.
#[derive(Debug, Default)]
struct ColumnSet {
    columns: IndexMap<String, ColumnOrigin>,
}

impl ColumnSet {
    fn add(&mut self, name: &str, origin: ColumnOrigin) {
        if !self.columns.contains_key(name) {
            self.columns.insert(name.to_string(), origin);
        }
    }

    fn origin(&self, name: &str) -> Option<ColumnOrigin> {
        self.columns.get(name).copied()
    }

    fn inject(&mut self, name: &str) {
        match self.columns.get_mut(name) {
            Some(origin) => *origin = ColumnOrigin::Injected,
            None => {
                self.columns.insert(name.to_string(), ColumnOrigin::Injected);
            }
        }
    }
}

struct SplitRecord {
    fixed: Map<String, Value>,
    answers: Map<String, Value>,
}

fn split_record(index: usize, record: &Value) -> Result<SplitRecord> {
    let Value::Object(fields) = record else {
        return Err(SurveyError::schema(format!(
            "response record {} is not an object",
            index
        )));
    };

    let mut fixed = fields.clone();
    let answers = match fixed.shift_remove(SURVEY_RESPONSE_FIELD) {
        Some(Value::Object(answers)) => answers,
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            tracing::warn!(
                "Response record {} has a non-object {} ({}), treating it as empty",
                index,
                SURVEY_RESPONSE_FIELD,
                type_name(&other)
            );
            Map::new()
        }
    };

    Ok(SplitRecord { fixed, answers })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn normalize(payload: &RawSurveyPayload) -> Result<NormalizedTable> {
    let survey_name = payload.survey_name().ok_or_else(|| {
        SurveyError::schema(format!("survey metadata has no string '{}'", SURVEY_NAME_FIELD))
    })?;

    let records = payload
        .responses
        .iter()
        .enumerate()
        .map(|(i, record)| split_record(i, record))
        .collect::<Result<Vec<_>>>()?;

    let has_answers = payload
        .responses
        .iter()
        .any(|r| r.get(SURVEY_RESPONSE_FIELD).is_some());
    if !has_answers {
        tracing::warn!("No survey responses found for survey {}.", survey_name);
    }

    let mut columns = ColumnSet::default();
    for record in &records {
        for name in record.fixed.keys() {
            columns.add(name, ColumnOrigin::Fixed);
        }
    }

    let mut shadowed = 0;
    for record in &records {
        for name in record.answers.keys() {
            if columns.origin(name) == Some(ColumnOrigin::Fixed) {
                shadowed += 1;
            } else {
                columns.add(name, ColumnOrigin::Answer);
            }
        }
    }
    if shadowed > 0 {
        tracing::debug!(
            "{}: {} answer value(s) shadowed by fixed fields of the same name",
            survey_name,
            shadowed
        );
    }

    columns.inject(SURVEY_NAME_FIELD);

    let rows = records
        .iter()
        .map(|record| {
            columns
                .columns
                .iter()
                .map(|(name, origin)| match origin {
                    ColumnOrigin::Injected => Value::String(survey_name.to_string()),
                    ColumnOrigin::Fixed => record.fixed.get(name).cloned().unwrap_or(Value::Null),
                    ColumnOrigin::Answer => record.answers.get(name).cloned().unwrap_or(Value::Null),
                })
                .collect()
        })
        .collect();

    let columns = columns
        .columns
        .into_iter()
        .map(|(name, origin)| Column { name, origin })
        .collect();

    Ok(NormalizedTable::new(columns, rows))
}
