//! Fixture errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors loading or placing fixtures
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading a fixture or writing to the mount
    #[error("io error at {path}: {source}")]
    Io {
        /// File or directory being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid YAML for the expected shape
    #[error("invalid fixture manifest {path}: {source}")]
    Manifest {
        /// Manifest file
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// No manifest entry for the object type and qualifier
    #[error("no {object_type} which {which} in the fixture manifest")]
    NotFound {
        /// Manifest section, e.g. `sample_epub`
        object_type: String,
        /// Qualifier text
        which: String,
    },

    /// ISBN too short or not ASCII, so no server path can be derived
    #[error("invalid ISBN '{0}'")]
    InvalidIsbn(String),

    /// Ingest mount is missing or not a directory
    #[error("expected the resource server mount {0} to be a folder")]
    MountNotADirectory(PathBuf),
}

impl FixtureError {
    /// Create IO error with path context
    #[must_use]
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for fixture operations
pub type FixtureResult<T> = Result<T, FixtureError>;
