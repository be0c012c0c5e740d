//! Source asset records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Kind of asset, which selects the comparison strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Epub,
    Binary,
    Text,
}

impl AssetKind {
    /// Guess kind from a file extension
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tif" | "tiff" => Self::Image,
            "epub" => Self::Epub,
            "txt" | "html" | "xhtml" | "htm" | "xml" | "opf" | "ncx" | "css" | "json" => Self::Text,
            _ => Self::Binary,
        }
    }

    /// Whether responses of this kind are compared visually
    #[inline]
    #[must_use]
    pub fn is_visual(self) -> bool {
        self == Self::Image
    }
}

/// A fixture asset, optionally placed on the server's ingest mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Absolute path of the fixture file
    pub local_path: PathBuf,
    /// ISBN the asset belongs to; drives the server-side directory layout
    pub isbn: String,
    /// Server path once uploaded (`/rs-test-.../...`)
    #[serde(default)]
    pub uploaded_path: Option<String>,
    pub kind: AssetKind,
    /// Logical member name → path inside the archive, for container assets
    #[serde(default)]
    pub internal_paths: BTreeMap<String, String>,
}

impl AssetRecord {
    /// Create record for a local fixture
    #[must_use]
    pub fn new(local_path: impl Into<PathBuf>, isbn: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            local_path: local_path.into(),
            isbn: isbn.into(),
            uploaded_path: None,
            kind,
            internal_paths: BTreeMap::new(),
        }
    }

    /// With an internal archive member mapping
    #[must_use]
    pub fn with_internal_path(
        mut self,
        name: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        self.internal_paths.insert(name.into(), member.into());
        self
    }

    /// Augment with the server-side path after upload
    #[must_use]
    pub fn uploaded_at(mut self, uploaded_path: impl Into<String>) -> Self {
        self.uploaded_path = Some(uploaded_path.into());
        self
    }

    /// Archive member for a logical name, matched case-insensitively
    #[must_use]
    pub fn internal_path(&self, name: &str) -> Option<&str> {
        self.internal_paths
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, member)| member.as_str())
    }
}
