//! Fixture manifest
//!
//! The manifest (`manifest.yml` in the data directory) maps an object type to
//! the assets available for it:
//!
//! ```yaml
//! sample_epub:
//!   - which: is standard
//!     local_path: epubs/sample.epub
//!     isbn: "9780000000002"
//!     internal_paths:
//!       cover image: OEBPS/images/cover.jpg
//! ```
//!
//! Each entry is told apart by its `which` qualifier ("is standard",
//! "has a width of 400, height of 300").

use crate::error::{FixtureError, FixtureResult};
use rsat_core::{AssetKind, AssetRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// Manifest file name inside the data directory
pub const MANIFEST_FILE: &str = "manifest.yml";

/// Normalize a human object name into a subject key (`"Sample ePub"` → `sample_epub`)
#[must_use]
pub fn subject_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Qualifier selecting one fixture of an object type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Which {
    /// The default fixture (`is standard`)
    Standard,
    /// A fixture with a described property (`has <text>`)
    Has(String),
}

impl Which {
    /// Qualifier for an attribute table: `has a k1 of v1, k2 of v2`
    ///
    /// Keys are lower-cased and the pairs sorted by key.
    #[must_use]
    pub fn from_attributes<K, V>(table: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = table
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let described: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| format!("{} of {v}", k.to_lowercase()))
            .collect();
        Self::Has(format!("a {}", described.join(", ")))
    }

    /// `Standard` when `with` is absent, otherwise `Has(with)`
    #[must_use]
    pub fn from_optional(with: Option<&str>) -> Self {
        match with {
            None => Self::Standard,
            Some(text) => Self::Has(text.trim().to_string()),
        }
    }

    fn matches(&self, qualifier: &str) -> bool {
        self.to_string().eq_ignore_ascii_case(qualifier.trim())
    }
}

impl Display for Which {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("is standard"),
            Self::Has(text) => write!(f, "has {text}"),
        }
    }
}

/// One fixture in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureEntry {
    /// Qualifier text, e.g. `is standard`
    pub which: String,
    /// Path relative to the data directory; also the tail of the upload path
    pub local_path: PathBuf,
    /// Drives the directory layout on the mount
    pub isbn: String,
    /// Derived from the file extension when absent
    #[serde(default)]
    pub kind: Option<AssetKind>,
    /// Human member names mapped to archive paths
    #[serde(default)]
    pub internal_paths: BTreeMap<String, String>,
}

impl FixtureEntry {
    /// Asset kind, declared or guessed from the extension
    #[must_use]
    pub fn kind(&self) -> AssetKind {
        self.kind
            .unwrap_or_else(|| AssetKind::from_path(&self.local_path))
    }

    /// Record for this fixture with its absolute local path
    #[must_use]
    pub fn to_record(&self, data_dir: &Path) -> AssetRecord {
        self.internal_paths.iter().fold(
            AssetRecord::new(data_dir.join(&self.local_path), &self.isbn, self.kind()),
            |record, (name, member)| record.with_internal_path(name, member),
        )
    }
}

/// Fixtures available to scenarios
#[derive(Debug, Clone)]
pub struct FixtureStore {
    data_dir: PathBuf,
    entries: BTreeMap<String, Vec<FixtureEntry>>,
}

impl FixtureStore {
    /// Load `manifest.yml` from `data_dir`
    ///
    /// # Errors
    /// The manifest is missing or not valid YAML
    pub fn open(data_dir: impl Into<PathBuf>) -> FixtureResult<Self> {
        let data_dir = data_dir.into();
        let path = data_dir.join(MANIFEST_FILE);
        let content =
            std::fs::read_to_string(&path).map_err(|e| FixtureError::io_error(&path, e))?;
        let entries = serde_yaml::from_str(&content)
            .map_err(|source| FixtureError::Manifest { path, source })?;
        Ok(Self::from_entries(data_dir, entries))
    }

    /// Store over in-memory entries
    #[must_use]
    pub fn from_entries(
        data_dir: impl Into<PathBuf>,
        entries: BTreeMap<String, Vec<FixtureEntry>>,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|(object_type, list)| (subject_name(&object_type), list))
            .collect();
        Self {
            data_dir: data_dir.into(),
            entries,
        }
    }

    /// Data directory fixture paths are relative to
    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Find the fixture of `object_type` matching `which`
    ///
    /// # Errors
    /// `NotFound` when no entry matches
    pub fn lookup(&self, object_type: &str, which: &Which) -> FixtureResult<&FixtureEntry> {
        let key = subject_name(object_type);
        self.entries
            .get(&key)
            .and_then(|list| list.iter().find(|entry| which.matches(&entry.which)))
            .ok_or_else(|| FixtureError::NotFound {
                object_type: key,
                which: which.to_string(),
            })
    }

    /// Absolute path of a fixture
    #[must_use]
    pub fn local_path(&self, entry: &FixtureEntry) -> PathBuf {
        self.data_dir.join(&entry.local_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r#"
image:
  - which: is standard
    local_path: images/standard.png
    isbn: "9780000000001"
  - which: has a height of 300, width of 400
    local_path: images/landscape.png
    isbn: "9780000000001"
Sample ePub:
  - which: is standard
    local_path: epubs/sample.epub
    isbn: "9780000000002"
    kind: epub
    internal_paths:
      Cover Image: OEBPS/images/cover.png
"#;

    fn store() -> FixtureStore {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), MANIFEST).unwrap();
        let store = FixtureStore::open(dir.path()).unwrap();
        // Paths only; nothing is read from the data directory after loading
        drop(dir);
        store
    }

    #[test]
    fn subject_names() {
        assert_eq!(subject_name("Sample ePub"), "sample_epub");
        assert_eq!(subject_name(" cover image data "), "cover_image_data");
    }

    #[test]
    fn attribute_qualifier_is_sorted_and_lowercased() {
        let which = Which::from_attributes([("Width", "400"), ("Height", "300")]);
        assert_eq!(which.to_string(), "has a height of 300, width of 400");
        assert_eq!(Which::from_optional(None), Which::Standard);
        assert_eq!(Which::from_optional(Some("a cover")).to_string(), "has a cover");
    }

    #[test]
    fn lookup_by_qualifier() {
        let store = store();
        let standard = store.lookup("image", &Which::Standard).unwrap();
        assert_eq!(standard.local_path, PathBuf::from("images/standard.png"));
        assert_eq!(standard.kind(), AssetKind::Image);

        let landscape = store
            .lookup("image", &Which::from_attributes([("width", "400"), ("height", "300")]))
            .unwrap();
        assert_eq!(landscape.local_path, PathBuf::from("images/landscape.png"));
    }

    #[test]
    fn object_types_are_normalized() {
        let store = store();
        let epub = store.lookup("sample ePub", &Which::Standard).unwrap();
        let record = epub.to_record(store.data_dir());
        assert_eq!(record.kind, AssetKind::Epub);
        assert_eq!(record.internal_path("cover image"), Some("OEBPS/images/cover.png"));
        assert!(record.local_path.ends_with("epubs/sample.epub"));
    }

    #[test]
    fn unknown_fixture_is_not_found() {
        let store = store();
        let err = store
            .lookup("image", &Which::Has("a sepia tint".into()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no image which has a sepia tint in the fixture manifest"
        );
        assert!(store.lookup("font", &Which::Standard).is_err());
    }

    #[test]
    fn malformed_manifest_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "image: [whatever: {").unwrap();
        assert!(matches!(
            FixtureStore::open(dir.path()),
            Err(FixtureError::Manifest { .. })
        ));
    }
}
