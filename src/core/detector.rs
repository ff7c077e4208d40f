use crate::domain::model::NormalizedTable;
use serde_json::Value;

/// Text prefix marking a cell as an embedded image (data URI).
pub const BINARY_PREFIX: &str = "data:image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind<'a> {
    Absent,
    Text(&'a str),
    Other,
}

impl<'a> CellKind<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Null => CellKind::Absent,
            Value::String(s) => CellKind::Text(s),
            _ => CellKind::Other,
        }
    }
}

/// Result of one pass over a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnProfile {
    pub text_cells: usize,
    pub other_cells: usize,
    pub binary_cells: usize,
}

impl ColumnProfile {
    pub fn scan<'a>(values: impl Iterator<Item = &'a Value>) -> Self {
        let mut profile = Self::default();
        for value in values {
            match CellKind::of(value) {
                CellKind::Absent => {}
                CellKind::Text(s) => {
                    profile.text_cells += 1;
                    if s.starts_with(BINARY_PREFIX) {
                        profile.binary_cells += 1;
                    }
                }
                CellKind::Other => profile.other_cells += 1,
            }
        }
        profile
    }

    /// Every present cell is text and at least one of them is a data URI.
    pub fn is_binary(&self) -> bool {
        self.other_cells == 0 && self.binary_cells > 0
    }
}

/// Names of the columns holding embedded binary data, in table order.
pub fn detect_binary_columns(table: &NormalizedTable) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter_map(|column| {
            let profile = ColumnProfile::scan(table.column_values(&column.name)?);
            profile.is_binary().then(|| column.name.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Column, ColumnOrigin};
    use serde_json::json;

    fn table(names: &[&str], rows: Vec<Vec<Value>>) -> NormalizedTable {
        let columns = names
            .iter()
            .map(|n| Column {
                name: n.to_string(),
                origin: ColumnOrigin::Answer,
            })
            .collect();
        NormalizedTable::new(columns, rows)
    }

    #[test]
    fn test_find_image_columns() {
        let t = table(
            &["image1", "image2", "text"],
            vec![
                vec![json!("data:image/png;base64,abc"), json!("data:image/png;base64,ghi"), json!("abc")],
                vec![json!("data:image/png;base64,def"), json!("data:image/png;base64,jkl"), json!("def")],
            ],
        );

        assert_eq!(detect_binary_columns(&t), vec!["image1", "image2"]);
        assert_eq!(
            detect_binary_columns(&t.without_columns(&["image1".to_string()])),
            vec!["image2"]
        );
        assert!(detect_binary_columns(
            &t.without_columns(&["image1".to_string(), "image2".to_string()])
        )
        .is_empty());
    }

    #[test]
    fn test_mixed_type_column_is_never_binary() {
        let t = table(
            &["photo"],
            vec![vec![json!("data:image/png;base64,abc")], vec![json!(42)]],
        );

        assert!(detect_binary_columns(&t).is_empty());
    }

    #[test]
    fn test_nulls_do_not_break_type_uniformity() {
        let t = table(
            &["photo", "notes"],
            vec![
                vec![Value::Null, json!("fine")],
                vec![json!("data:image/jpeg;base64,/9j/"), Value::Null],
            ],
        );

        assert_eq!(detect_binary_columns(&t), vec!["photo"]);
    }

    #[test]
    fn test_one_image_cell_is_enough() {
        let t = table(
            &["drawing"],
            vec![vec![json!("skipped")], vec![json!("data:image/png;base64,AA==")]],
        );

        assert_eq!(detect_binary_columns(&t), vec!["drawing"]);
    }

    #[test]
    fn test_prefix_must_be_at_start() {
        let t = table(&["caption"], vec![vec![json!("see data:image/png;base64,AA==")]]);

        assert!(detect_binary_columns(&t).is_empty());
    }

    #[test]
    fn test_all_null_column_is_not_binary() {
        let t = table(&["empty"], vec![vec![Value::Null], vec![Value::Null]]);

        assert_eq!(ColumnProfile::scan(t.column_values("empty").unwrap()), ColumnProfile::default());
        assert!(detect_binary_columns(&t).is_empty());
    }
}
