//! Errors surfaced by the command-line front end.

use std::path::PathBuf;

/// Command failure.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from the core library.
    #[error(transparent)]
    Core(#[from] vidgrab_core::Error),

    /// Input could not be read.
    #[error("Failed to read {path}: {source}")]
    Input {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No URL in the batch input could be started.
    #[error("No downloadable URL found in {0}")]
    EmptyBatch(PathBuf),
}

/// Result alias for CLI commands.
pub type CliResult<T> = std::result::Result<T, CliError>;
