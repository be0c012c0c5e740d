//! Asset comparison
//!
//! The strategy is chosen by the asset kind of the request, never by sniffing
//! the response body:
//!
//! - **Exact**: byte-for-byte equality. Used for archive members, generic
//!   downloads and byte ranges.
//! - **Visual**: equal pixel dimensions, then perceptual duplicate detection,
//!   then an optional "received is smaller" compression bound.
//!
//! A failed comparison keeps diagnostic copies of both artifacts on disk
//! (see [`DiagnosticSink`]); every other temporary is scoped to the call.

use crate::asset::AssetKind;
use crate::config::HarnessConfig;
use crate::diagnostics::{extension_of, DiagnosticSink, BINARY_EXTENSION};
use crate::error::{ArtifactPaths, HarnessError, HarnessResult, MismatchError, ToolError};
use crate::fingerprint::{Fingerprint, Fingerprinter, GradientFingerprinter};
use crate::raster::{DimensionProbe, Dimensions, RasterTool};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Equivalence relation used for a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Byte-for-byte equality
    Exact,
    /// Equal dimensions and perceptual duplicates
    Visual,
}

impl From<AssetKind> for Strategy {
    fn from(kind: AssetKind) -> Self {
        if kind.is_visual() {
            Self::Visual
        } else {
            Self::Exact
        }
    }
}

/// Outcome of one comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonVerdict {
    /// Whether every check held
    pub pass: bool,
    /// Strategy that produced this verdict
    pub strategy: Strategy,
    /// Every failed check, in evaluation order
    pub reasons: Vec<String>,
    /// Diagnostic copies, present only on failure
    pub artifacts: Option<ArtifactPaths>,
    /// Pixel size of the received image (visual strategy, decodable bodies only)
    pub received_dimensions: Option<Dimensions>,
}

impl ComparisonVerdict {
    fn passed(strategy: Strategy, received_dimensions: Option<Dimensions>) -> Self {
        Self {
            pass: true,
            strategy,
            reasons: Vec::new(),
            artifacts: None,
            received_dimensions,
        }
    }

    fn failed(
        strategy: Strategy,
        reasons: Vec<String>,
        artifacts: ArtifactPaths,
        received_dimensions: Option<Dimensions>,
    ) -> Self {
        Self {
            pass: false,
            strategy,
            reasons,
            artifacts: Some(artifacts),
            received_dimensions,
        }
    }

    /// All failure reasons joined into one message
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if self.reasons.is_empty() {
            None
        } else {
            Some(self.reasons.join("; "))
        }
    }

    /// Turn a failing verdict into its mismatch error
    ///
    /// # Errors
    /// `Content` for the exact strategy, `Visual` for the visual strategy
    pub fn into_result(self) -> Result<Self, MismatchError> {
        if self.pass {
            return Ok(self);
        }
        let artifacts = self.artifacts.unwrap_or_default();
        Err(match self.strategy {
            Strategy::Exact => MismatchError::Content {
                reason: self.reasons.join("; "),
                artifacts,
            },
            Strategy::Visual => MismatchError::Visual {
                reasons: self.reasons,
                artifacts,
            },
        })
    }
}

/// Options for a visual comparison
#[derive(Debug, Clone, Copy, Default)]
pub struct VisualOptions {
    /// Require the received image to be strictly smaller than the expected file
    pub ensure_compressed: bool,
}

/// Compares captured bodies against expected artifacts
#[derive(Clone)]
pub struct AssetComparator {
    probe: Arc<dyn DimensionProbe>,
    fingerprinter: Arc<dyn Fingerprinter>,
    diagnostics: DiagnosticSink,
    timeout: Duration,
}

impl std::fmt::Debug for AssetComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetComparator")
            .field("diagnostics", &self.diagnostics)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AssetComparator {
    /// Create comparator from its collaborators
    #[must_use]
    pub fn new(
        probe: Arc<dyn DimensionProbe>,
        fingerprinter: Arc<dyn Fingerprinter>,
        diagnostics: DiagnosticSink,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            fingerprinter,
            diagnostics,
            timeout,
        }
    }

    /// Comparator using `identify` for dimensions and a gradient hash
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Arc::new(RasterTool::new(config.raster.clone(), config.tool_timeout())),
            Arc::new(GradientFingerprinter::new(config.duplicate_threshold)),
            DiagnosticSink::new(&config.diagnostics_dir),
            config.tool_timeout(),
        )
    }

    /// Diagnostic sink used on failure
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    /// Compare `received` against the file at `expected` using the strategy for `kind`
    ///
    /// # Errors
    /// The expected file cannot be read, a tool fails, or diagnostics cannot be written
    pub async fn compare(
        &self,
        kind: AssetKind,
        expected: &Path,
        received: &[u8],
        options: VisualOptions,
    ) -> HarnessResult<ComparisonVerdict> {
        match Strategy::from(kind) {
            Strategy::Visual => self.compare_visual(expected, received, options).await,
            Strategy::Exact => {
                let expected_bytes = tokio::fs::read(expected)
                    .await
                    .map_err(|e| HarnessError::io_error(expected, e))?;
                self.compare_exact(&expected_bytes, received, BINARY_EXTENSION)
            }
        }
    }

    /// Byte-for-byte comparison
    ///
    /// # Errors
    /// Diagnostic copies cannot be written after a mismatch
    pub fn compare_exact(
        &self,
        expected: &[u8],
        received: &[u8],
        extension: &str,
    ) -> HarnessResult<ComparisonVerdict> {
        if expected == received {
            return Ok(ComparisonVerdict::passed(Strategy::Exact, None));
        }

        let reason = match expected.iter().zip(received).position(|(a, b)| a != b) {
            Some(offset) => format!(
                "The body of the response was not the same as the source: first difference at byte {offset} (expected {} bytes, received {} bytes)",
                expected.len(),
                received.len()
            ),
            None => format!(
                "The body of the response was not the same as the source: expected {} bytes, received {} bytes",
                expected.len(),
                received.len()
            ),
        };
        let artifacts = self.diagnostics.persist_bytes(expected, received, extension)?;
        Ok(ComparisonVerdict::failed(
            Strategy::Exact,
            vec![reason],
            artifacts,
            None,
        ))
    }

    /// Perceptual comparison of the image at `expected` with `received`
    ///
    /// Different pixel dimensions fail without fingerprinting either image. A
    /// received body that cannot be probed or fingerprinted is a failed check,
    /// not a tool fault, so its diagnostic copies are kept like any other.
    ///
    /// # Errors
    /// The expected image cannot be probed or fingerprinted, a tool times out,
    /// or diagnostics cannot be written
    pub async fn compare_visual(
        &self,
        expected: &Path,
        received: &[u8],
        options: VisualOptions,
    ) -> HarnessResult<ComparisonVerdict> {
        let extension = extension_of(expected);
        let mut received_file = tempfile::Builder::new()
            .prefix("rsat-received-")
            .suffix(&extension)
            .tempfile()
            .map_err(|e| HarnessError::io_error(std::env::temp_dir(), e))?;
        if let Err(e) = received_file.write_all(received) {
            return Err(HarnessError::io_error(received_file.path(), e));
        }
        let received_path = received_file.path();

        let expected_dimensions = self.probe(expected).await?;

        let mut reasons = Vec::new();
        let received_dimensions = match self.probe(received_path).await {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                reasons.push(undecodable(e)?);
                None
            }
        };

        match received_dimensions {
            Some(dimensions) if dimensions == expected_dimensions => {
                let expected_hash = self.fingerprint(expected).await?;
                match self.fingerprint(received_path).await {
                    Ok(received_hash) => {
                        if !self.fingerprinter.is_duplicate(&expected_hash, &received_hash) {
                            reasons.push(format!(
                                "The received image is not similar enough to the expected one (distance {})",
                                expected_hash.distance(&received_hash)
                            ));
                        }
                    }
                    Err(e) => reasons.push(undecodable(e)?),
                }

                if options.ensure_compressed {
                    let expected_len = tokio::fs::metadata(expected)
                        .await
                        .map_err(|e| HarnessError::io_error(expected, e))?
                        .len();
                    if received.len() as u64 >= expected_len {
                        reasons.push(format!(
                            "The received image is not more compressed than the expected one ({} bytes, expected fewer than {expected_len})",
                            received.len()
                        ));
                    }
                }
            }
            Some(dimensions) => reasons.push(format!(
                "The received image is not the same size as the expected one ({dimensions} should have been {expected_dimensions})"
            )),
            None => {}
        }

        if reasons.is_empty() {
            tracing::debug!(dimensions = ?received_dimensions, "images match");
            return Ok(ComparisonVerdict::passed(Strategy::Visual, received_dimensions));
        }

        let artifacts = self
            .diagnostics
            .persist_files(expected, received_path, &extension)?;
        Ok(ComparisonVerdict::failed(
            Strategy::Visual,
            reasons,
            artifacts,
            received_dimensions,
        ))
    }

    async fn probe(&self, path: &Path) -> HarnessResult<Dimensions> {
        let dimensions = tokio::time::timeout(self.timeout, self.probe.dimensions(path))
            .await
            .map_err(|_| ToolError::timeout("dimension probe", self.timeout))??;
        Ok(dimensions)
    }

    async fn fingerprint(&self, path: &Path) -> HarnessResult<Fingerprint> {
        let fingerprinter = Arc::clone(&self.fingerprinter);
        let owned = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || fingerprinter.fingerprint(&owned));
        let joined = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| ToolError::timeout("fingerprint", self.timeout))?;
        let fingerprint = joined.map_err(|e| ToolError::Worker {
            tool: "fingerprint".to_string(),
            message: e.to_string(),
        })??;
        Ok(fingerprint)
    }
}

/// Failure reason for a received body the tools could not read
///
/// Timeouts stay errors: a hung tool says nothing about the body.
fn undecodable(error: HarnessError) -> HarnessResult<String> {
    match error {
        HarnessError::Tool(ToolError::Timeout { .. }) => Err(error),
        other => Ok(format!("The received body is not a decodable image: {other}")),
    }
}

/// Expected body of a ranged request: `source` from `offset` through EOF
///
/// An offset past the end yields an empty slice.
#[must_use]
pub fn expected_range(source: &[u8], offset: u64) -> &[u8] {
    let start = usize::try_from(offset).map_or(source.len(), |o| o.min(source.len()));
    &source[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MockFingerprinter;
    use crate::raster::HeaderProbe;
    use pretty_assertions::assert_eq;

    fn comparator(fingerprinter: MockFingerprinter, diagnostics: &Path) -> AssetComparator {
        AssetComparator::new(
            Arc::new(HeaderProbe),
            Arc::new(fingerprinter),
            DiagnosticSink::new(diagnostics),
            Duration::from_secs(5),
        )
    }

    fn duplicate_fingerprinter() -> MockFingerprinter {
        let mut fingerprinter = MockFingerprinter::new();
        fingerprinter
            .expect_fingerprint()
            .returning(|_| Ok(Fingerprint::from_bytes(vec![0u8; 8])));
        fingerprinter.expect_is_duplicate().return_const(true);
        fingerprinter
    }

    #[test]
    fn identical_buffers_pass_exact() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = comparator(MockFingerprinter::new(), dir.path())
            .compare_exact(b"same bytes", b"same bytes", ".bin")
            .unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.reason(), None);
        assert!(verdict.into_result().is_ok());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn differing_buffers_fail_exact_with_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = comparator(MockFingerprinter::new(), dir.path())
            .compare_exact(b"abcdef", b"abcXef", ".bin")
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict.reason().unwrap().contains("first difference at byte 3"));

        let artifacts = verdict.artifacts.clone().unwrap();
        assert_eq!(std::fs::read(&artifacts.source).unwrap(), b"abcdef");
        assert_eq!(std::fs::read(&artifacts.received).unwrap(), b"abcXef");
        assert!(matches!(
            verdict.into_result(),
            Err(MismatchError::Content { .. })
        ));
    }

    #[test]
    fn truncated_body_fails_exact() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = comparator(MockFingerprinter::new(), dir.path())
            .compare_exact(b"abcdef", b"abc", ".txt")
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict.reason().unwrap().contains("expected 6 bytes, received 3 bytes"));
    }

    #[test]
    fn byte_range_slicing() {
        let source: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let expected = expected_range(&source, 50);
        assert_eq!(expected.len(), 950);
        assert_eq!(expected, &source[50..]);
        assert!(expected_range(&source, 5000).is_empty());
        assert_eq!(expected_range(&source, 0), source.as_slice());
    }

    #[tokio::test]
    async fn different_dimensions_fail_before_fingerprinting() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, rsat_test_utils::gradient_png(200, 150)).unwrap();
        let received = rsat_test_utils::gradient_png(100, 75);

        let mut fingerprinter = MockFingerprinter::new();
        fingerprinter.expect_fingerprint().times(0);
        fingerprinter.expect_is_duplicate().times(0);

        let verdict = comparator(fingerprinter, &dir.path().join("diag"))
            .compare_visual(&expected, &received, VisualOptions::default())
            .await
            .unwrap();

        assert!(!verdict.pass);
        assert_eq!(
            verdict.reasons,
            [
                "The received image is not the same size as the expected one \
                 (100x75 should have been 200x150)"
            ]
        );
        let artifacts = verdict.artifacts.clone().unwrap();
        assert!(artifacts.source.to_string_lossy().ends_with("-source.png"));
        assert!(artifacts.received.exists());
        assert!(matches!(
            verdict.into_result(),
            Err(MismatchError::Visual { .. })
        ));
    }

    #[tokio::test]
    async fn undecodable_body_fails_with_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, rsat_test_utils::gradient_png(40, 30)).unwrap();
        let diag = dir.path().join("diag");

        let mut fingerprinter = MockFingerprinter::new();
        fingerprinter.expect_fingerprint().times(0);
        fingerprinter.expect_is_duplicate().times(0);

        let verdict = comparator(fingerprinter, &diag)
            .compare_visual(&expected, b"<html>404</html>", VisualOptions::default())
            .await
            .unwrap();

        assert!(!verdict.pass);
        assert_eq!(verdict.received_dimensions, None);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(verdict.reasons[0].starts_with("The received body is not a decodable image"));

        let artifacts = verdict.artifacts.clone().unwrap();
        assert!(artifacts.source.starts_with(&diag));
        assert_eq!(std::fs::read(&artifacts.received).unwrap(), b"<html>404</html>");
        assert_eq!(std::fs::read_dir(&diag).unwrap().count(), 2);

        let err: HarnessError = verdict.into_result().unwrap_err().into();
        assert!(err.is_assertion_failure());
        assert!(matches!(err, HarnessError::Mismatch(MismatchError::Visual { .. })));
    }

    #[tokio::test]
    async fn undecodable_expected_image_is_a_tool_fault() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, b"not an image").unwrap();

        let err = comparator(MockFingerprinter::new(), &dir.path().join("diag"))
            .compare_visual(
                &expected,
                &rsat_test_utils::gradient_png(40, 30),
                VisualOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Tool(ToolError::Decode { .. })));
        assert!(!dir.path().join("diag").exists());
    }

    #[tokio::test]
    async fn exact_dispatch_names_artifacts_as_binary() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("chapter.xhtml");
        std::fs::write(&expected, b"<html/>").unwrap();

        let verdict = comparator(MockFingerprinter::new(), &dir.path().join("diag"))
            .compare(AssetKind::Text, &expected, b"<body/>", VisualOptions::default())
            .await
            .unwrap();
        let artifacts = verdict.artifacts.unwrap();
        assert!(artifacts.source.to_string_lossy().ends_with("-source.bin"));
        assert!(artifacts.received.to_string_lossy().ends_with("-received.bin"));
    }

    #[tokio::test]
    async fn duplicate_images_of_same_size_pass() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, rsat_test_utils::gradient_png(200, 150)).unwrap();
        let received = rsat_test_utils::gradient_png(200, 150);

        let verdict = comparator(duplicate_fingerprinter(), &dir.path().join("diag"))
            .compare_visual(&expected, &received, VisualOptions::default())
            .await
            .unwrap();

        assert!(verdict.pass);
        assert_eq!(verdict.received_dimensions, Some(Dimensions::new(200, 150)));
        assert!(!dir.path().join("diag").exists());
    }

    #[tokio::test]
    async fn non_duplicate_images_fail() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, rsat_test_utils::gradient_png(64, 64)).unwrap();
        let received = rsat_test_utils::inverted_gradient_png(64, 64);

        let mut fingerprinter = MockFingerprinter::new();
        fingerprinter
            .expect_fingerprint()
            .times(2)
            .returning(|_| Ok(Fingerprint::from_bytes(vec![0u8; 8])));
        fingerprinter.expect_is_duplicate().times(1).return_const(false);

        let verdict = comparator(fingerprinter, &dir.path().join("diag"))
            .compare_visual(&expected, &received, VisualOptions::default())
            .await
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict.reasons[0].contains("not similar enough"));
    }

    #[tokio::test]
    async fn compression_bound_is_a_separate_check() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        let bytes = rsat_test_utils::gradient_png(80, 60);
        std::fs::write(&expected, &bytes).unwrap();

        let comparator = comparator(duplicate_fingerprinter(), &dir.path().join("diag"));
        let relaxed = comparator
            .compare_visual(&expected, &bytes, VisualOptions::default())
            .await
            .unwrap();
        assert!(relaxed.pass);

        let strict = comparator
            .compare_visual(
                &expected,
                &bytes,
                VisualOptions {
                    ensure_compressed: true,
                },
            )
            .await
            .unwrap();
        assert!(!strict.pass);
        assert_eq!(strict.reasons.len(), 1);
        assert!(strict.reasons[0].contains("not more compressed"));
    }

    #[tokio::test]
    async fn dispatch_follows_asset_kind() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("chapter.xhtml");
        std::fs::write(&expected, b"<html/>").unwrap();

        let verdict = comparator(MockFingerprinter::new(), &dir.path().join("diag"))
            .compare(AssetKind::Text, &expected, b"<html/>", VisualOptions::default())
            .await
            .unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.strategy, Strategy::Exact);
    }

    #[test]
    fn strategy_from_kind() {
        assert_eq!(Strategy::from(AssetKind::Image), Strategy::Visual);
        assert_eq!(Strategy::from(AssetKind::Epub), Strategy::Exact);
        assert_eq!(Strategy::from(AssetKind::Binary), Strategy::Exact);
    }
}
