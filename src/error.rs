//! Fatal error types
//!
//! Only conditions that end an operation live here. Per-file problems are
//! reported through [`crate::progress::Reporter`] and never become an `Err`.

use std::io;
use std::path::PathBuf;

/// Errors that abort a merge or split
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller handed over no selection entries at all
    #[error("no files or folders were selected")]
    EmptySelection,

    /// The destination directory could not be created
    #[error("could not create output directory '{}': {source}", path.display())]
    CreateOutputDir { path: PathBuf, source: io::Error },

    /// The merged artifact could not be created for writing
    #[error("could not create merged file '{}': {source}", path.display())]
    CreateArtifact { path: PathBuf, source: io::Error },

    /// The merged artifact could not be opened or read
    #[error("could not read merged file '{}': {source}", path.display())]
    OpenArtifact { path: PathBuf, source: io::Error },

    /// The output directory vanished or became unwritable during a split
    #[error("output directory '{}' is not accessible or writable", path.display())]
    OutputDirUnavailable { path: PathBuf },

    /// A format descriptor violates its own invariants
    #[error("format '{name}' is invalid: {reason}")]
    InvalidFormat { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
