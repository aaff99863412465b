//! Relay errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by relay control operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// A logging session could not be started because its file could not be
    /// created; logging stays inactive.
    #[error("could not create log file {path}: {source}")]
    LogOpen {
        /// Path of the file that could not be created
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}
