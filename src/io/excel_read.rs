use std::collections::HashSet;
use std::io::{Cursor, Read, Seek};

use calamine::{DataType, Ods, Range, Reader, Sheets, Xls, Xlsb, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::Result;
use crate::model::{CellValue, SpreadsheetFormat, Table, UploadedFile};

/// Opens an uploaded blob with the reader matching its declared format.
pub fn open_workbook(upload: &UploadedFile) -> Result<Sheets<Cursor<Vec<u8>>>> {
    let cursor = Cursor::new(upload.bytes.clone());
    let workbook = match upload.format {
        SpreadsheetFormat::Xls => Sheets::Xls(Xls::new(cursor).map_err(calamine::Error::from)?),
        SpreadsheetFormat::Xlsb => {
            Sheets::Xlsb(Xlsb::new(cursor).map_err(calamine::Error::from)?)
        }
        SpreadsheetFormat::Xlsx => {
            Sheets::Xlsx(Xlsx::new(cursor).map_err(calamine::Error::from)?)
        }
        SpreadsheetFormat::Ods => Sheets::Ods(Ods::new(cursor).map_err(calamine::Error::from)?),
    };
    Ok(workbook)
}

/// Reads one sheet into a table, skipping the first `header_rows` worksheet
/// rows. Returns `None` when the workbook has no sheet with that name.
pub fn read_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet: &str,
    header_rows: usize,
) -> Result<Option<Table>> {
    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Ok(None);
    }
    let Some(range) = workbook.worksheet_range(sheet) else {
        return Ok(None);
    };
    Ok(Some(range_to_table(&range?, header_rows)))
}

/// Converts a worksheet range into a table. The first non-blank row at or
/// after `header_rows` provides the column names.
pub fn range_to_table(range: &Range<DataType>, header_rows: usize) -> Table {
    // Ranges start at the first used cell, not at A1.
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    let mut rows = range
        .rows()
        .enumerate()
        .filter(|(offset, _)| first_row + offset >= header_rows)
        .map(|(_, row)| row.iter().map(cell_value).collect::<Vec<_>>())
        .filter(|row| !row.iter().all(CellValue::is_blank));

    let Some(header) = rows.next() else {
        return Table::default();
    };

    let mut table = Table::with_columns(header_names(&header));
    for row in rows {
        table.push_row(row);
    }
    table
}

fn header_names(header: &[CellValue]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(header.len());

    for (idx, cell) in header.iter().enumerate() {
        let base = if cell.is_blank() {
            format!("Unnamed: {idx}")
        } else {
            cell.to_string()
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while taken.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        taken.insert(name.clone());
        names.push(name);
    }

    names
}

fn cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Int(value) => CellValue::Int(*value),
        DataType::Float(value) => CellValue::Float(*value),
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => serial_to_datetime(*serial)
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Float(*serial)),
        DataType::Error(_) | DataType::Empty => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Converts an Excel serial date. Serials that do not map to a representable
/// timestamp yield `None` and the cell is kept as a number.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let millis = (serial * MILLIS_PER_DAY).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis as i64)?)
}
