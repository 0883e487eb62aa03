use csv::Writer;

use crate::error::{Result, ToolError};
use crate::model::Table;

/// Serialises a table as CSV: a header record followed by one record per row.
/// A table without columns produces no bytes.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    if table.columns.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|err| ToolError::Io(err.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellValue;

    #[test]
    fn writes_header_then_rows_without_index() {
        let table = Table {
            columns: vec!["ID".into(), "NOTE, QUOTED".into(), "AMOUNT".into()],
            rows: vec![
                vec![
                    CellValue::Text("a".into()),
                    CellValue::Empty,
                    CellValue::Float(1.5),
                ],
                vec![
                    CellValue::Text("b".into()),
                    CellValue::Bool(true),
                    CellValue::Float(0.0),
                ],
            ],
        };

        let csv = table_to_csv(&table).expect("CSV written");

        assert_eq!(
            String::from_utf8(csv).expect("utf-8"),
            "ID,\"NOTE, QUOTED\",AMOUNT\na,,1.5\nb,True,0\n"
        );
    }

    #[test]
    fn table_without_columns_is_empty() {
        let csv = table_to_csv(&Table::default()).expect("CSV written");
        assert!(csv.is_empty());
    }
}
