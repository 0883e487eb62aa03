//! Core library for the dodo-tools command line application.
//!
//! The library merges same-named sheets across line of business and
//! reinsurance workbooks and packages the results as a CSV archive. Readers,
//! writers, and the remote publisher live under [`io`], table transformations
//! in [`merge`], run configuration in [`plan`], and the orchestration that ties
//! them together in [`generate`].

pub mod error;
pub mod generate;
pub mod io;
pub mod merge;
pub mod model;
pub mod plan;

pub use error::{Result, ToolError};
