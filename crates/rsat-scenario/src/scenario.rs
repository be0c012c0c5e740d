//! Scenario execution context
//!
//! A [`Scenario`] owns everything one acceptance scenario touches: uploaded
//! fixtures, named subjects remembered between steps, and the single
//! captured response. Steps run strictly in sequence.
//!
//! Step methods are grouped the way scenarios read:
//! - `given_*` put fixtures on the server
//! - `request_*` issue exactly one GET and capture the response
//! - `assert_*` check the captured response

use crate::client::ResourceClient;
use crate::error::{ScenarioError, ScenarioResult};
use rand::Rng;
use rsat_core::diagnostics::BINARY_EXTENSION;
use rsat_core::transform::WIDTH;
use rsat_core::{
    expected_range, ArchiveExtractor, AssetComparator, AssetKind, AssetRecord, ComparisonVerdict,
    HarnessConfig, RasterTool, ResponseCapture, SourceImage, TransformParams, TransformReplicator,
    VisualOptions,
};
use rsat_fixtures::{subject_name, FixtureStore, UploadSession, Which};
use std::collections::BTreeMap;
use std::path::Path;

/// Member name no fixture archive contains
pub const MISSING_MEMBER: &str = "definitely_shouldnt_exist.not_an_ext";

/// Subject key of the ePub that archive steps read from
pub const SAMPLE_EPUB: &str = "sample_epub";

/// Subject key of the image that image steps read from
pub const IMAGE: &str = "image";

/// How a download is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// The stored file, no parameter segment
    Direct,
    /// Through the default `params;v=0` segment
    Processed,
}

/// Which bytes of a download are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// The whole file, no `Range` header
    Whole,
    /// A random offset that is neither the first nor the last byte
    RandomOffset,
    /// From this byte offset through EOF
    Offset(u64),
}

/// State of one running scenario
#[derive(Debug)]
pub struct Scenario {
    client: ResourceClient,
    store: FixtureStore,
    uploads: UploadSession,
    capture: ResponseCapture,
    replicator: TransformReplicator,
    comparator: AssetComparator,
    assets: BTreeMap<String, AssetRecord>,
    data: BTreeMap<String, Vec<u8>>,
    image_data: Option<Vec<u8>>,
    resize_attributes: BTreeMap<String, String>,
    start_byte: Option<u64>,
    expected_content_type: Option<String>,
}

impl Scenario {
    /// Scenario over the fixture manifest in `config.data_dir`
    ///
    /// # Errors
    /// The manifest cannot be loaded, the mount directory does not exist, or
    /// the HTTP client cannot be built
    pub fn new(config: &HarnessConfig) -> ScenarioResult<Self> {
        let store = FixtureStore::open(&config.data_dir)?;
        Self::with_store(config, store)
    }

    /// Scenario over an already loaded fixture store
    ///
    /// # Errors
    /// The mount directory does not exist or the HTTP client cannot be built
    pub fn with_store(config: &HarnessConfig, store: FixtureStore) -> ScenarioResult<Self> {
        Ok(Self {
            client: ResourceClient::from_config(config)?,
            store,
            uploads: UploadSession::open(&config.mount_dir)?,
            capture: ResponseCapture::new(),
            replicator: TransformReplicator::new(RasterTool::new(
                config.raster.clone(),
                config.tool_timeout(),
            )),
            comparator: AssetComparator::from_config(config),
            assets: BTreeMap::new(),
            data: BTreeMap::new(),
            image_data: None,
            resize_attributes: BTreeMap::new(),
            start_byte: None,
            expected_content_type: None,
        })
    }

    /// Forget subjects and the captured response
    pub fn reset(&mut self) {
        self.capture.reset();
        self.assets.clear();
        self.data.clear();
        self.image_data = None;
        self.resize_attributes.clear();
        self.start_byte = None;
        self.expected_content_type = None;
    }

    /// Remove uploaded fixtures from the mount
    ///
    /// # Errors
    /// The upload folder cannot be removed
    pub fn finish(mut self) -> ScenarioResult<()> {
        self.uploads.teardown()?;
        Ok(())
    }

    /// Captured responses
    #[inline]
    #[must_use]
    pub fn capture(&self) -> &ResponseCapture {
        &self.capture
    }

    /// Upload session of this scenario
    #[inline]
    #[must_use]
    pub fn uploads(&self) -> &UploadSession {
        &self.uploads
    }

    /// A remembered asset, by object name
    ///
    /// # Errors
    /// No asset was set up under that name
    pub fn asset(&self, object_type: &str) -> ScenarioResult<&AssetRecord> {
        let key = subject_name(object_type);
        self.assets
            .get(&key)
            .ok_or_else(|| {
                ScenarioError::step(format!("no {key} has been set up in this scenario"))
            })
    }

    /// Offset sent in the last ranged request
    #[inline]
    #[must_use]
    pub fn start_byte(&self) -> Option<u64> {
        self.start_byte
    }

    // Given

    /// Upload the `object_type` fixture, the standard one unless `with` describes another
    ///
    /// # Errors
    /// The fixture is unknown or cannot be copied to the mount
    pub fn given_asset_exists(
        &mut self,
        object_type: &str,
        with: Option<&str>,
    ) -> ScenarioResult<&AssetRecord> {
        let which = Which::from_optional(with);
        let record = self.uploads.upload_fixture(&self.store, object_type, &which)?;
        Ok(self.remember(subject_name(object_type), record))
    }

    /// Upload the image fixture described by an attribute table
    ///
    /// # Errors
    /// No image fixture has those attributes, or the copy fails
    pub fn given_image_with_attributes<K, V>(
        &mut self,
        table: impl IntoIterator<Item = (K, V)>,
    ) -> ScenarioResult<&AssetRecord>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let which = Which::from_attributes(table);
        let record = self.uploads.upload_fixture(&self.store, IMAGE, &which)?;
        Ok(self.remember(IMAGE.to_string(), record))
    }

    fn remember(&mut self, key: String, record: AssetRecord) -> &AssetRecord {
        tracing::debug!(subject = %key, "remembered asset");
        self.assets.insert(key.clone(), record);
        &self.assets[&key]
    }

    // When

    /// Request a member of the sample ePub, remembering its bytes as `<member> data`
    ///
    /// An image member also becomes the image later image steps compare with.
    ///
    /// `requirement` may be `"scaled down"` (width 10); anything else is a step error.
    ///
    /// # Errors
    /// No sample ePub, unknown member or requirement, extraction or HTTP failure
    pub async fn request_archive_member(
        &mut self,
        internal_object: &str,
        requirement: Option<&str>,
    ) -> ScenarioResult<()> {
        let epub = self.asset(SAMPLE_EPUB)?;
        let member = epub.internal_path(internal_object).ok_or_else(|| {
            ScenarioError::step(format!(
                "The sample ePub given doesn't have a {internal_object}"
            ))
        })?;
        let member = member.to_string();
        let archive_path = epub.local_path.clone();
        let uploaded = uploaded_path(epub)?.to_string();

        let mut params = TransformParams::default_version();
        match requirement {
            None => {}
            Some("scaled down") => {
                params.insert("img:w", "10");
                self.resize_attributes = [(WIDTH.to_string(), "10".to_string())].into();
            }
            Some(other) => {
                return Err(ScenarioError::step(format!(
                    "I don't know how to deal with the additional requirement: {other}"
                )));
            }
        }

        let content = ArchiveExtractor.extract_member(&archive_path, &member)?;
        if AssetKind::from_path(&member).is_visual() {
            self.image_data = Some(content.clone());
        }
        self.data
            .insert(subject_name(&format!("{internal_object} data")), content);

        let path = params.request_path(&format!("{uploaded}/{member}"));
        self.expect_content_type_of(&path);
        self.get(&path, &[]).await
    }

    /// Request a member the sample ePub does not contain
    ///
    /// # Errors
    /// No sample ePub, or HTTP failure
    pub async fn request_missing_archive_member(&mut self) -> ScenarioResult<()> {
        let uploaded = uploaded_path(self.asset(SAMPLE_EPUB)?)?;
        let path = TransformParams::default_version()
            .request_path(&format!("{uploaded}/{MISSING_MEMBER}"));
        self.get(&path, &[]).await
    }

    /// Download an uploaded asset, whole or from a byte offset onwards
    ///
    /// # Errors
    /// Unknown asset, a file too small for a random offset, or HTTP failure
    pub async fn request_download(
        &mut self,
        kind: DownloadKind,
        object_type: &str,
        range: ByteRange,
    ) -> ScenarioResult<()> {
        let record = self.asset(object_type)?;
        let uploaded = uploaded_path(record)?;
        let path = match kind {
            DownloadKind::Direct => uploaded.to_string(),
            DownloadKind::Processed => TransformParams::default_version().request_path(uploaded),
        };

        let offset = match range {
            ByteRange::Whole => None,
            ByteRange::Offset(offset) => Some(offset),
            ByteRange::RandomOffset => {
                let size = file_size(&record.local_path)?;
                if size < 3 {
                    return Err(ScenarioError::step(format!(
                        "{} is too small to pick an inner byte offset",
                        record.local_path.display()
                    )));
                }
                Some(rand::rng().random_range(1..size - 1))
            }
        };

        self.start_byte = offset;
        let headers: Vec<(&str, String)> = offset
            .map(|n| ("Range", format!("bytes={n}-")))
            .into_iter()
            .collect();
        self.get(&path, &headers).await
    }

    /// Request the image through the filters of a human attribute table
    ///
    /// # Errors
    /// No image subject, or HTTP failure
    pub async fn request_image_with_filters<K, V>(
        &mut self,
        table: impl IntoIterator<Item = (K, V)>,
    ) -> ScenarioResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = TransformParams::default_version().merge(TransformParams::decode(table));
        let path = params.request_path(uploaded_path(self.asset(IMAGE)?)?);
        self.expect_content_type_of(&path);
        self.get(&path, &[]).await
    }

    /// Request the image converted to `jpg` or `png`
    ///
    /// # Errors
    /// Another format, no image subject, or HTTP failure
    pub async fn request_image_in_format(&mut self, format: &str) -> ScenarioResult<()> {
        if !matches!(format, "jpg" | "png") {
            return Err(ScenarioError::step(format!(
                "format conversion to {format} is not part of the server contract"
            )));
        }
        let uploaded = uploaded_path(self.asset(IMAGE)?)?;
        let path = TransformParams::default_version().request_path(&format!("{uploaded}.{format}"));
        self.expect_content_type_of(&path);
        self.get(&path, &[]).await
    }

    fn expect_content_type_of(&mut self, path: &str) {
        self.expected_content_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
    }

    async fn get(&mut self, path: &str, headers: &[(&str, String)]) -> ScenarioResult<()> {
        let response = self.client.get(path, headers).await?;
        self.capture.capture(response);
        Ok(())
    }

    // Then

    /// The body equals the remembered `<object> data`, or else the object's fixture file
    ///
    /// # Errors
    /// Mismatch, no captured response, or no such subject
    pub async fn assert_response_is(
        &self,
        internal_object: &str,
    ) -> ScenarioResult<ComparisonVerdict> {
        let expected = match self.data.get(&subject_name(&format!("{internal_object} data"))) {
            Some(data) => data.clone(),
            None => read(&self.asset(internal_object)?.local_path).await?,
        };
        let body = &self.capture.last()?.body;
        Ok(self
            .comparator
            .compare_exact(&expected, body, BINARY_EXTENSION)?
            .into_result()?)
    }

    /// The body is the image, visually similar and optionally more compressed
    ///
    /// With `image_type`, the expected image is the remembered `<type> image data`.
    ///
    /// # Errors
    /// Mismatch, missing subject, tool failure, or no captured response
    pub async fn assert_response_image_similar(
        &mut self,
        image_type: Option<&str>,
        more_compressed: bool,
    ) -> ScenarioResult<ComparisonVerdict> {
        if let Some(image_type) = image_type {
            let key = subject_name(&format!("{image_type} image data"));
            let data = self
                .data
                .get(&key)
                .ok_or_else(|| ScenarioError::step(format!("no {key} has been remembered")))?;
            self.image_data = Some(data.clone());
        }
        self.compare_response_image(&BTreeMap::new(), more_compressed)
            .await
    }

    /// The body is the image at the size requested by an earlier step
    ///
    /// # Errors
    /// Mismatch, tool failure, or no captured response
    pub async fn assert_response_image_at_requested_size(
        &self,
    ) -> ScenarioResult<ComparisonVerdict> {
        self.compare_response_image(&self.resize_attributes, false)
            .await
    }

    /// The body is the image transformed by an attribute table
    ///
    /// # Errors
    /// Unsupported attribute, mismatch, tool failure, or no captured response
    pub async fn assert_response_image_altered<K, V>(
        &self,
        table: impl IntoIterator<Item = (K, V)>,
    ) -> ScenarioResult<ComparisonVerdict>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let attributes: BTreeMap<String, String> = table
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.compare_response_image(&attributes, false).await
    }

    async fn compare_response_image(
        &self,
        alter: &BTreeMap<String, String>,
        ensure_compressed: bool,
    ) -> ScenarioResult<ComparisonVerdict> {
        let source = match (self.assets.get(IMAGE), &self.image_data) {
            (Some(image), _) => SourceImage::Path(&image.local_path),
            (None, Some(data)) => SourceImage::Bytes(data),
            (None, None) => {
                return Err(ScenarioError::step(
                    "no image or image data to compare the response with",
                ))
            }
        };
        let body = &self.capture.last()?.body;

        let expected = self.replicator.replicate_attributes(source, alter).await?;
        let verdict = self
            .comparator
            .compare_visual(expected.path(), body, VisualOptions { ensure_compressed })
            .await?;
        Ok(verdict.into_result()?)
    }

    /// `Content-Type` matches the type of the requested path's extension
    ///
    /// # Errors
    /// Mismatch, no expectation recorded, or no captured response
    pub fn assert_content_type(&self) -> ScenarioResult<()> {
        let expected = self
            .expected_content_type
            .as_deref()
            .ok_or_else(|| {
                ScenarioError::step("no content type is expected for the last request")
            })?;
        let actual = self.capture.last()?.content_type();
        if actual == Some(expected) {
            Ok(())
        } else {
            Err(ScenarioError::assertion(format!(
                "expected Content-Type {expected}, got {}",
                actual.unwrap_or("nothing")
            )))
        }
    }

    /// Header `name` has exactly `value`
    ///
    /// # Errors
    /// Mismatch or no captured response
    pub fn assert_header_equals(&self, name: &str, value: &str) -> ScenarioResult<()> {
        let actual = self.capture.last()?.header(name);
        if actual == Some(value) {
            Ok(())
        } else {
            Err(ScenarioError::assertion(format!(
                "expected {name} header to be \"{value}\", got {actual:?}"
            )))
        }
    }

    /// Header `name` is present
    ///
    /// # Errors
    /// Missing header or no captured response
    pub fn assert_header_present(&self, name: &str) -> ScenarioResult<()> {
        if self.capture.last()?.header(name).is_some() {
            Ok(())
        } else {
            Err(ScenarioError::assertion(format!("the {name} header is missing")))
        }
    }

    /// `Content-Location` references a resource under the table's filters
    ///
    /// # Errors
    /// Mismatch or no captured response
    pub fn assert_content_location_filters<K, V>(
        &self,
        table: impl IntoIterator<Item = (K, V)>,
    ) -> ScenarioResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = TransformParams::default_version().merge(TransformParams::decode(table));
        let prefix = format!("/{}/", params.encode());
        let actual = self.capture.last()?.header("content-location");
        match actual {
            Some(location) if location.starts_with(&prefix) => Ok(()),
            other => Err(ScenarioError::assertion(format!(
                "expected Content-Location starting with {prefix}, got {other:?}"
            ))),
        }
    }

    /// The body is the object's fixture from the recorded start byte onwards
    ///
    /// # Errors
    /// Mismatch, no ranged request, or no captured response
    pub async fn assert_correct_byte_range(
        &self,
        object_type: &str,
    ) -> ScenarioResult<ComparisonVerdict> {
        let offset = self
            .start_byte
            .ok_or_else(|| ScenarioError::step("no byte range was requested"))?;
        let source = read(&self.asset(object_type)?.local_path).await?;
        let body = &self.capture.last()?.body;
        Ok(self
            .comparator
            .compare_exact(expected_range(&source, offset), body, BINARY_EXTENSION)?
            .into_result()?)
    }

    /// Response status equals `code`
    ///
    /// # Errors
    /// Mismatch or no captured response
    pub fn assert_status(&self, code: u16) -> ScenarioResult<()> {
        let status = self.capture.last()?.status;
        if status == code {
            Ok(())
        } else {
            Err(ScenarioError::assertion(format!(
                "expected status {code}, got {status}"
            )))
        }
    }
}

fn uploaded_path(record: &AssetRecord) -> ScenarioResult<&str> {
    record.uploaded_path.as_deref().ok_or_else(|| {
        ScenarioError::step(format!(
            "{} has not been uploaded",
            record.local_path.display()
        ))
    })
}

fn file_size(path: &Path) -> ScenarioResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| rsat_core::HarnessError::io_error(path, e).into())
}

async fn read(path: &Path) -> ScenarioResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| rsat_core::HarnessError::io_error(path, e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(mount: &Path, data: &Path) -> Scenario {
        let config = HarnessConfig::new()
            .with_resource_server("http://127.0.0.1:9")
            .with_mount_dir(mount)
            .with_data_dir(data);
        Scenario::with_store(&config, FixtureStore::from_entries(data, BTreeMap::new())).unwrap()
    }

    #[test]
    fn steps_before_any_request_fail_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = scenario(dir.path(), dir.path());
        let err = scenario.assert_status(200).unwrap_err();
        assert!(matches!(err, ScenarioError::Harness(_)));
        assert!(!err.is_assertion_failure());
    }

    #[test]
    fn missing_mount_is_rejected_at_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::new()
            .with_resource_server("http://127.0.0.1:9")
            .with_mount_dir(dir.path().join("wrong-mount"))
            .with_data_dir(dir.path());
        let store = FixtureStore::from_entries(dir.path(), BTreeMap::new());
        let err = Scenario::with_store(&config, store).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Fixture(rsat_fixtures::FixtureError::MountNotADirectory(_))
        ));
        assert!(!dir.path().join("wrong-mount").exists());
    }

    #[tokio::test]
    async fn archive_steps_need_an_epub() {
        let dir = tempfile::tempdir().unwrap();
        let mut scenario = scenario(dir.path(), dir.path());
        let err = scenario
            .request_archive_member("cover image", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Step(_)));
    }

    #[tokio::test]
    async fn unsupported_format_is_step_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut scenario = scenario(dir.path(), dir.path());
        let err = scenario.request_image_in_format("tiff").await.unwrap_err();
        assert!(matches!(err, ScenarioError::Step(_)));
    }
}
