use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::{Result, ToolError};

/// Category an uploaded workbook was submitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    /// Line of business workbook.
    LineOfBusiness,
    /// Reinsurance workbook.
    Reinsurance,
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCategory::LineOfBusiness => write!(f, "line of business"),
            FileCategory::Reinsurance => write!(f, "reinsurance"),
        }
    }
}

/// Container format declared for an uploaded workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Legacy BIFF `.xls` workbook.
    Xls,
    /// Binary `.xlsb` workbook.
    Xlsb,
    /// XML based `.xlsx` / `.xlsm` workbook.
    Xlsx,
    /// OpenDocument spreadsheet.
    Ods,
}

impl SpreadsheetFormat {
    /// Detects the format from the file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "xls" => Some(SpreadsheetFormat::Xls),
            "xlsb" => Some(SpreadsheetFormat::Xlsb),
            "xlsx" | "xlsm" => Some(SpreadsheetFormat::Xlsx),
            "ods" => Some(SpreadsheetFormat::Ods),
            _ => None,
        }
    }
}

/// A workbook handed to the tool: a named blob plus its declared format.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Display name, usually the file name.
    pub name: String,
    pub category: FileCategory,
    pub format: SpreadsheetFormat,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Creates an upload from an in-memory blob.
    pub fn new(
        name: impl Into<String>,
        category: FileCategory,
        format: SpreadsheetFormat,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            format,
            bytes,
        }
    }

    /// Reads an upload from disk, detecting its format from the extension.
    pub fn from_path(path: &Path, category: FileCategory) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let format = SpreadsheetFormat::from_path(path)
            .ok_or_else(|| ToolError::UnsupportedFormat(path.to_path_buf()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = fs::read(path)?;
        Ok(Self::new(name, category, format, bytes))
    }
}

/// A single cell of a merged table.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Whether the cell carries no data. Whitespace-only text counts as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Bool(true) => f.write_str("True"),
            CellValue::Bool(false) => f.write_str("False"),
            CellValue::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// A rectangular table with named columns. Every row holds exactly one cell
/// per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Creates an empty table with the given header.
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the table width.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    /// Position of the column with exactly this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }
}

/// One serialised sheet produced by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub sheet_name: String,
    /// Entry name inside the archive, `<sheet>.csv`.
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn csv(sheet_name: impl Into<String>, contents: Vec<u8>) -> Self {
        let sheet_name = sheet_name.into();
        Self {
            file_name: format!("{sheet_name}.csv"),
            sheet_name,
            contents,
        }
    }
}
