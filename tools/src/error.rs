//! Error types for the catalog tools

use std::io;
use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading, writing, renaming or listing failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File is not valid JSON (message carries line and column)
    #[error("JSON error in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document parsed but is not the expected shape
    #[error("invalid package metadata in {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },

    /// Root directory to walk does not exist
    #[error("root directory {} does not exist", .0.display())]
    MissingRoot(PathBuf),

    /// `package.json.bak` could not be written
    #[error("backup of {} failed: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
