use crate::domain::model::NormalizedTable;
use crate::utils::error::Result;
use serde_json::Value;

/// UTF-8 signature so spreadsheet tools detect the encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

/// Header row plus one line per row; nulls are empty fields, nested values are JSON text.
pub fn render_csv(table: &NormalizedTable) -> Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(table.column_names())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(render_cell))?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}
