//! Table level transformations applied between reading and serialising a
//! sheet: concatenation across uploads, numeric normalisation, and column
//! removal.

use crate::model::{CellValue, Table};
use crate::plan::NumericPolicy;

/// Concatenates tables in order. Columns are aligned by name and the result
/// carries the union of all columns in order of first appearance.
pub fn concat<I>(tables: I) -> Table
where
    I: IntoIterator<Item = Table>,
{
    let mut merged = Table::default();

    for table in tables {
        let positions: Vec<usize> = table
            .columns
            .iter()
            .map(|column| match merged.column_index(column) {
                Some(idx) => idx,
                None => {
                    merged.columns.push(column.clone());
                    merged.columns.len() - 1
                }
            })
            .collect();

        let width = merged.columns.len();
        for row in &mut merged.rows {
            row.resize(width, CellValue::Empty);
        }

        for row in table.rows {
            let mut aligned = vec![CellValue::Empty; width];
            for (cell, &target) in row.into_iter().zip(&positions) {
                aligned[target] = cell;
            }
            merged.rows.push(aligned);
        }
    }

    merged
}

/// Coerces every column that looks numeric under `policy`, filling blanks and
/// unparsable leftovers with zero. Returns the names of the coerced columns.
pub fn coerce_numeric_columns(table: &mut Table, policy: &NumericPolicy) -> Vec<String> {
    let mut coerced = Vec::new();

    for idx in 0..table.columns.len() {
        if !column_looks_numeric(table, idx, policy) {
            continue;
        }
        for row in &mut table.rows {
            let cell = &mut row[idx];
            *cell = numeric_value(cell).unwrap_or(CellValue::Float(0.0));
        }
        coerced.push(table.columns[idx].clone());
    }

    coerced
}

fn column_looks_numeric(table: &Table, idx: usize, policy: &NumericPolicy) -> bool {
    let mut sampled = 0usize;
    let mut numeric = 0usize;

    for cell in table
        .rows
        .iter()
        .map(|row| &row[idx])
        .filter(|cell| !cell.is_blank())
        .take(policy.sample_size)
    {
        sampled += 1;
        if numeric_value(cell).is_some() {
            numeric += 1;
        }
    }

    sampled > 0 && numeric as f64 / sampled as f64 >= policy.threshold
}

/// Numeric reading of a cell, if it has one.
fn numeric_value(cell: &CellValue) -> Option<CellValue> {
    match cell {
        CellValue::Int(value) => Some(CellValue::Int(*value)),
        CellValue::Float(value) => Some(CellValue::Float(*value)),
        CellValue::Text(value) => parse_number(value.trim()),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<CellValue> {
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = text.parse::<i64>() {
        return Some(CellValue::Int(value));
    }
    // Rust accepts "inf" and "NaN", which are not numbers to a spreadsheet user.
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(CellValue::Float(value)),
        _ => None,
    }
}

/// Removes the column named exactly `name`. Returns whether it was present.
pub fn drop_column(table: &mut Table, name: &str) -> bool {
    let Some(idx) = table.column_index(name) else {
        return false;
    };
    table.columns.remove(idx);
    for row in &mut table.rows {
        row.remove(idx);
    }
    true
}
