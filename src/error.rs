use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool loads uploads, merges sheets, packages, or publishes results.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the spreadsheet reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::Error),

    /// Errors raised while serialising a table to CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors raised while building the results archive.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Transport level failures while talking to the remote repository.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when the remote repository rejects the archive upload.
    #[error("publishing failed with status {status}: {body}")]
    Publish { status: u16, body: String },

    /// Raised when the run is started without any uploaded workbook.
    #[error("no input files: provide at least one line of business or reinsurance workbook")]
    NoInputs,

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when a file extension does not map to a known spreadsheet format.
    #[error("unsupported spreadsheet format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Raised when a repository reference is not of the form `owner/name`.
    #[error("invalid repository '{0}': expected owner/name")]
    InvalidRepository(String),

    /// Raised when publishing is requested without an access token.
    #[error("publishing requires an access token: set GITHUB_TOKEN or pass --github-token")]
    MissingToken,

    /// Raised when a sheet plan is inconsistent.
    #[error("invalid sheet plan: {0}")]
    InvalidPlan(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
