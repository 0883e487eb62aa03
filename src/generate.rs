use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::Sheets;
use tracing::{debug, error, info, instrument};

use crate::error::{Result, ToolError};
use crate::io::archive;
use crate::io::csv_write;
use crate::io::excel_read;
use crate::io::publish::{ArchivePublisher, PublishOutcome};
use crate::merge;
use crate::model::{FileCategory, OutputFile, Table, UploadedFile};
use crate::plan::SheetPlan;

type OpenWorkbook<'a> = (&'a UploadedFile, Sheets<Cursor<Vec<u8>>>);

/// A non-fatal problem met while reading one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetIssue {
    /// Sheet being read, `None` when the workbook itself could not be opened.
    pub sheet: Option<String>,
    pub file: String,
    pub message: String,
}

impl fmt::Display for SheetIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(
                f,
                "error reading {sheet} from {}: {}",
                self.file, self.message
            ),
            None => write!(f, "error opening {}: {}", self.file, self.message),
        }
    }
}

/// Outcome of running a plan over a set of uploads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateReport {
    /// One CSV per distinct sheet name, in processing order.
    pub outputs: Vec<OutputFile>,
    pub issues: Vec<SheetIssue>,
}

impl GenerateReport {
    pub fn output(&self, sheet: &str) -> Option<&OutputFile> {
        self.outputs.iter().find(|output| output.sheet_name == sheet)
    }
}

/// Where the packaged results go.
#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// Local path the archive is written to.
    pub output: PathBuf,
    /// Optional folder receiving the individual CSV files.
    pub results_dir: Option<PathBuf>,
    /// Path of the archive inside the remote repository.
    pub remote_path: String,
    pub message: String,
}

/// Summary of a packaged run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub report: GenerateReport,
    pub archive_size: usize,
    pub published: Option<PublishOutcome>,
}

/// Loads line of business files followed by reinsurance files. The order of
/// the returned uploads is the row order of every merged sheet.
pub fn load_uploads(lob: &[PathBuf], reinsurance: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    lob.iter()
        .map(|path| (path, FileCategory::LineOfBusiness))
        .chain(reinsurance.iter().map(|path| (path, FileCategory::Reinsurance)))
        .map(|(path, category)| UploadedFile::from_path(path, category))
        .collect()
}

/// Runs the plan over the uploads. Read failures are collected as issues and
/// never abort the run; only an empty upload set or an invalid plan is fatal.
#[instrument(level = "info", skip_all, fields(uploads = uploads.len()))]
pub fn generate(uploads: &[UploadedFile], plan: &SheetPlan) -> Result<GenerateReport> {
    if uploads.is_empty() {
        return Err(ToolError::NoInputs);
    }
    plan.validate()?;

    let mut issues = Vec::new();
    let mut workbooks: Vec<OpenWorkbook<'_>> = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match excel_read::open_workbook(upload) {
            Ok(workbook) => {
                debug!(file = %upload.name, category = %upload.category, "opened workbook");
                workbooks.push((upload, workbook));
            }
            Err(err) => {
                error!(file = %upload.name, %err, "failed to open workbook");
                issues.push(SheetIssue {
                    sheet: None,
                    file: upload.name.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    let order = plan.processing_order();
    let total = order.len();
    let mut outputs: Vec<OutputFile> = Vec::with_capacity(total);

    for (position, sheet) in order.iter().enumerate() {
        let contents = match plan.copy_source(sheet) {
            Some(source) => outputs
                .iter()
                .find(|output| output.sheet_name == source)
                .map(|output| output.contents.clone())
                .unwrap_or_default(),
            None => {
                let table = merge_sheet(sheet, &mut workbooks, plan, &mut issues);
                csv_write::table_to_csv(&table)?
            }
        };
        outputs.push(OutputFile::csv(sheet.as_str(), contents));
        info!(sheet = %sheet, position = position + 1, total, "processed sheet");
    }

    info!(
        outputs = outputs.len(),
        issues = issues.len(),
        "all sheets processed"
    );
    Ok(GenerateReport { outputs, issues })
}

fn merge_sheet(
    sheet: &str,
    workbooks: &mut [OpenWorkbook<'_>],
    plan: &SheetPlan,
    issues: &mut Vec<SheetIssue>,
) -> Table {
    let mut tables = Vec::new();

    for (upload, workbook) in workbooks.iter_mut() {
        match excel_read::read_sheet(workbook, sheet, plan.header_rows) {
            Ok(Some(table)) => {
                debug!(sheet, file = %upload.name, rows = table.rows.len(), "read sheet");
                tables.push(table);
            }
            Ok(None) if plan.report_missing_sheets => {
                error!(sheet, file = %upload.name, "sheet not found");
                issues.push(SheetIssue {
                    sheet: Some(sheet.to_string()),
                    file: upload.name.clone(),
                    message: "sheet not found".to_string(),
                });
            }
            Ok(None) => debug!(sheet, file = %upload.name, "sheet absent, skipping"),
            Err(err) => {
                error!(sheet, file = %upload.name, %err, "failed to read sheet");
                issues.push(SheetIssue {
                    sheet: Some(sheet.to_string()),
                    file: upload.name.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    let mut merged = merge::concat(tables);
    let coerced = merge::coerce_numeric_columns(&mut merged, &plan.numeric);
    if !coerced.is_empty() {
        debug!(sheet, ?coerced, "coerced numeric columns");
    }
    for column in plan.drops_for(sheet) {
        if merge::drop_column(&mut merged, column) {
            debug!(sheet, column, "dropped column");
        }
    }
    merged
}

/// Bundles the report into an archive, writes it locally and, when a
/// publisher is given, pushes it to the remote repository.
#[instrument(level = "info", skip_all, fields(output = %options.output.display()))]
pub fn package(
    report: GenerateReport,
    options: &PackageOptions,
    publisher: Option<&dyn ArchivePublisher>,
) -> Result<RunSummary> {
    let archive = archive::build_archive(&report.outputs)?;
    write_file(&options.output, &archive)?;
    info!(bytes = archive.len(), "archive written");

    if let Some(dir) = &options.results_dir {
        archive::write_results_dir(dir, &report.outputs)?;
        debug!(dir = %dir.display(), "results folder written");
    }

    let published = match publisher {
        Some(publisher) => {
            Some(publisher.publish(&options.remote_path, &archive, &options.message)?)
        }
        None => None,
    };

    Ok(RunSummary {
        report,
        archive_size: archive.len(),
        published,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}
