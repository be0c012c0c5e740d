//! Error types for the response-validation engine
//!
//! Provides the error taxonomy for:
//! - Transform parsing (unsupported or malformed attributes)
//! - External tool execution (mogrify, identify, fingerprinting)
//! - Comparison failures (content and visual mismatches)
//! - Archive member extraction
//! - Response capture ordering
//! - Configuration loading

use std::path::PathBuf;
use std::time::Duration;

/// Errors while turning a human attribute table into a transformation
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Attribute keys left over after every known key was consumed
    #[error("unsupported transform parameters: {}", .keys.join(", "))]
    UnsupportedParameter { keys: Vec<String> },

    /// Known key with a value that cannot be interpreted
    #[error("invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },

    /// Crop and stretch need both sides of the target geometry
    #[error("resize method {method} requires both Width and Height")]
    MissingDimension { method: &'static str },
}

impl TransformError {
    /// Create invalid value error
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Errors from external tools invoked as subprocesses or blocking work
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool could not be started
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool ran and exited unsuccessfully
    #[error("{tool} exited with {status}: {stderr}")]
    Exit {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Tool did not finish within the configured bound
    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    /// Tool succeeded but its output could not be interpreted
    #[error("unparseable output from {tool}: '{output}'")]
    UnparseableOutput { tool: String, output: String },

    /// In-process image decoding failed
    #[error("failed to decode image {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Background worker panicked or was cancelled
    #[error("worker for {tool} failed: {message}")]
    Worker { tool: String, message: String },
}

impl ToolError {
    /// Create timeout error
    pub fn timeout(tool: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            tool: tool.into(),
            after,
        }
    }
}

/// Paths of the diagnostic copies kept after a failed comparison
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Copy of the expected artifact
    pub source: PathBuf,
    /// Copy of the received artifact
    pub received: PathBuf,
}

/// Assertion failures: the expected "test failed" outcome
#[derive(Debug, thiserror::Error)]
pub enum MismatchError {
    /// Exact-bytes comparison failed
    #[error("{reason} (artifacts: {}, {})", .artifacts.source.display(), .artifacts.received.display())]
    Content {
        reason: String,
        artifacts: ArtifactPaths,
    },

    /// Visual-similarity comparison failed
    #[error("{} (artifacts: {}, {})", .reasons.join("; "), .artifacts.source.display(), .artifacts.received.display())]
    Visual {
        reasons: Vec<String>,
        artifacts: ArtifactPaths,
    },
}

impl MismatchError {
    /// Diagnostic copies retained for this failure
    #[inline]
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactPaths {
        match self {
            Self::Content { artifacts, .. } | Self::Visual { artifacts, .. } => artifacts,
        }
    }
}

/// Errors while extracting a member from a container archive
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Member name absent from the archive manifest
    #[error("member '{member}' not found in archive {archive}")]
    MemberNotFound { archive: PathBuf, member: String },

    /// IO error opening or reading the archive
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive container is malformed
    #[error("invalid archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ArchiveError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors reading the captured response slot
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// An assertion ran before any request was made in this scenario
    #[error("no response has been captured in this scenario")]
    NoResponseCaptured,
}

/// Errors loading harness configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Environment override could not be applied
    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },
}

/// Combined engine error
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Attribute table could not be parsed
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// External tool or decoder failed
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Comparison failed; the only assertion failure
    #[error("mismatch: {0}")]
    Mismatch(#[from] MismatchError),

    /// Archive member could not be read
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Assertion ran before any request
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// IO error on scratch or diagnostic files
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this is an assertion failure rather than a system fault
    #[inline]
    #[must_use]
    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, Self::Mismatch(_))
    }
}

/// Result type alias for engine operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_parameter_display_names_keys() {
        let err = TransformError::UnsupportedParameter {
            keys: vec!["Quality".to_string(), "Blur".to_string()],
        };
        assert_eq!(err.to_string(), "unsupported transform parameters: Quality, Blur");
    }

    #[test]
    fn member_not_found_display() {
        let err = ArchiveError::MemberNotFound {
            archive: PathBuf::from("/data/book.epub"),
            member: "OEBPS/missing.xhtml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "member 'OEBPS/missing.xhtml' not found in archive /data/book.epub"
        );
    }

    #[test]
    fn timeout_display() {
        let err = ToolError::timeout("mogrify", Duration::from_secs(30));
        assert_eq!(err.to_string(), "mogrify timed out after 30s");
    }

    #[test]
    fn mismatch_is_assertion_failure() {
        let err: HarnessError = MismatchError::Content {
            reason: "body differs".to_string(),
            artifacts: ArtifactPaths {
                source: PathBuf::from("/tmp/a-source.bin"),
                received: PathBuf::from("/tmp/a-received.bin"),
            },
        }
        .into();
        assert!(err.is_assertion_failure());

        let err: HarnessError = CaptureError::NoResponseCaptured.into();
        assert!(!err.is_assertion_failure());
    }
}
