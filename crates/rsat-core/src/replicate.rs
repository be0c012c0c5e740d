//! Independent replication of server-side transformations
//!
//! The expected output for a transformed image is produced by running the
//! same declared transformation through ImageMagick on a scratch copy of the
//! source. The fixture asset itself is never modified.

use crate::error::{HarnessError, HarnessResult};
use crate::raster::RasterTool;
use crate::transform::TransformSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Where the source image comes from
#[derive(Debug, Clone, Copy)]
pub enum SourceImage<'a> {
    /// A file on disk (fixture asset)
    Path(&'a Path),
    /// In-memory bytes (e.g. a member extracted from an archive)
    Bytes(&'a [u8]),
}

/// A replicated image inside its own scratch directory
///
/// The directory, and every file in it, is removed when this is dropped.
#[derive(Debug)]
pub struct ReplicatedImage {
    _dir: TempDir,
    path: PathBuf,
}

impl ReplicatedImage {
    /// Path of the transformed image
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the transformed image in bytes
    ///
    /// # Errors
    /// The file cannot be stat'ed
    pub fn byte_len(&self) -> HarnessResult<u64> {
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| HarnessError::io_error(&self.path, e))
    }
}

/// Replicates declared transformations with an external raster tool
#[derive(Debug, Clone)]
pub struct TransformReplicator {
    tool: RasterTool,
}

impl TransformReplicator {
    /// Create replicator using `tool`
    #[inline]
    #[must_use]
    pub fn new(tool: RasterTool) -> Self {
        Self { tool }
    }

    /// Raster tool used for replication
    #[inline]
    #[must_use]
    pub fn tool(&self) -> &RasterTool {
        &self.tool
    }

    /// Parse `attributes` strictly, then replicate
    ///
    /// # Errors
    /// Unsupported or invalid attributes, IO failure, or tool failure
    pub async fn replicate_attributes(
        &self,
        source: SourceImage<'_>,
        attributes: &BTreeMap<String, String>,
    ) -> HarnessResult<ReplicatedImage> {
        let spec = TransformSpec::from_attributes(attributes)?;
        self.replicate(source, &spec).await
    }

    /// Copy `source` to scratch space and apply `spec` to the copy
    ///
    /// With a `format`, the result is the sibling file `mogrify -format`
    /// writes, carrying the new extension.
    ///
    /// # Errors
    /// IO failure on the scratch copy or tool failure
    pub async fn replicate(
        &self,
        source: SourceImage<'_>,
        spec: &TransformSpec,
    ) -> HarnessResult<ReplicatedImage> {
        let dir = tempfile::Builder::new()
            .prefix("rsat-replicate-")
            .tempdir()
            .map_err(|e| HarnessError::io_error(std::env::temp_dir(), e))?;

        let working = match source {
            SourceImage::Path(path) => {
                let name = match path.extension() {
                    Some(ext) => format!("source-image.{}", ext.to_string_lossy()),
                    None => "source-image".to_string(),
                };
                let working = dir.path().join(name);
                tokio::fs::copy(path, &working)
                    .await
                    .map_err(|e| HarnessError::io_error(path, e))?;
                working
            }
            SourceImage::Bytes(bytes) => {
                let working = dir.path().join("source-image");
                tokio::fs::write(&working, bytes)
                    .await
                    .map_err(|e| HarnessError::io_error(&working, e))?;
                working
            }
        };

        if spec.is_identity() {
            return Ok(ReplicatedImage {
                _dir: dir,
                path: working,
            });
        }

        let args = spec.mogrify_args();
        tracing::debug!(?args, path = %working.display(), "replicating transform");
        self.tool.mogrify(&args, &working).await?;

        let path = match &spec.format {
            Some(format) => working.with_extension(format),
            None => working,
        };
        Ok(ReplicatedImage { _dir: dir, path })
    }
}
