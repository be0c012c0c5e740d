//! Diagnostic copies of mismatched artifacts
//!
//! When a comparison fails, both compared artifacts are copied to
//! `<dir>/<id>-source<ext>` and `<dir>/<id>-received<ext>` and the location
//! is printed so a human can inspect the exact bytes that diverged. These
//! copies are the only files that outlive a comparison.

use crate::error::{ArtifactPaths, HarnessError, HarnessResult};
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Extension used when the artifact kind has no natural one
pub const BINARY_EXTENSION: &str = ".bin";

/// Writer for diagnostic copies
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    dir: PathBuf,
}

impl DiagnosticSink {
    /// Create sink writing into `dir`
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist two in-memory buffers
    ///
    /// # Errors
    /// The diagnostics directory cannot be created or written
    pub fn persist_bytes(
        &self,
        expected: &[u8],
        received: &[u8],
        extension: &str,
    ) -> HarnessResult<ArtifactPaths> {
        let (id, paths) = self.allocate(extension)?;
        write(&paths.source, expected)?;
        write(&paths.received, received)?;
        self.announce(id, &paths, extension);
        Ok(paths)
    }

    /// Persist copies of two files
    ///
    /// # Errors
    /// The diagnostics directory cannot be created or a copy fails
    pub fn persist_files(
        &self,
        expected: &Path,
        received: &Path,
        extension: &str,
    ) -> HarnessResult<ArtifactPaths> {
        let (id, paths) = self.allocate(extension)?;
        copy(expected, &paths.source)?;
        copy(received, &paths.received)?;
        self.announce(id, &paths, extension);
        Ok(paths)
    }

    fn allocate(&self, extension: &str) -> HarnessResult<(Ulid, ArtifactPaths)> {
        std::fs::create_dir_all(&self.dir).map_err(|e| HarnessError::io_error(&self.dir, e))?;
        let id = Ulid::new();
        let ext = normalize_extension(extension);
        let paths = ArtifactPaths {
            source: self.dir.join(format!("{id}-source{ext}")),
            received: self.dir.join(format!("{id}-received{ext}")),
        };
        Ok((id, paths))
    }

    fn announce(&self, id: Ulid, paths: &ArtifactPaths, extension: &str) {
        tracing::warn!(
            source = %paths.source.display(),
            received = %paths.received.display(),
            "comparison failed; diagnostic copies kept"
        );
        let pattern = self
            .dir
            .join(format!("{id}-*{}", normalize_extension(extension)));
        println!("Please check {}", pattern.display());
    }
}

/// Turn `jpg`, `.jpg` or an empty string into a dotted extension
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim_start_matches('.');
    if trimmed.is_empty() {
        BINARY_EXTENSION.to_string()
    } else {
        format!(".{trimmed}")
    }
}

/// Dotted extension of a path, falling back to `.bin`
#[must_use]
pub fn extension_of(path: &Path) -> String {
    normalize_extension(
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default(),
    )
}

fn write(path: &Path, data: &[u8]) -> HarnessResult<()> {
    std::fs::write(path, data).map_err(|e| HarnessError::io_error(path, e))
}

fn copy(from: &Path, to: &Path) -> HarnessResult<()> {
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| HarnessError::io_error(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_normalization() {
        assert_eq!(normalize_extension("jpg"), ".jpg");
        assert_eq!(normalize_extension(".png"), ".png");
        assert_eq!(normalize_extension(""), ".bin");
        assert_eq!(extension_of(Path::new("a/b/cover.JPG")), ".JPG");
        assert_eq!(extension_of(Path::new("a/b/noext")), ".bin");
    }

    #[test]
    fn persist_bytes_keeps_both_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new(dir.path().join("diag"));

        let paths = sink.persist_bytes(b"expected", b"received", ".bin").unwrap();
        assert_eq!(std::fs::read(&paths.source).unwrap(), b"expected");
        assert_eq!(std::fs::read(&paths.received).unwrap(), b"received");

        let source_name = paths.source.file_name().unwrap().to_string_lossy().into_owned();
        let received_name = paths.received.file_name().unwrap().to_string_lossy().into_owned();
        assert!(source_name.ends_with("-source.bin"));
        assert!(received_name.ends_with("-received.bin"));
        assert_eq!(
            source_name.trim_end_matches("-source.bin"),
            received_name.trim_end_matches("-received.bin")
        );
    }

    #[test]
    fn identifiers_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new(dir.path());

        let first = sink.persist_bytes(b"a", b"b", "png").unwrap();
        let second = sink.persist_bytes(b"a", b"b", "png").unwrap();
        assert_ne!(first.source, second.source);
        assert!(first.source.to_string_lossy().ends_with(".png"));
    }
}
