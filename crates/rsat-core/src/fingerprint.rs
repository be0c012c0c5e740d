//! Perceptual fingerprints
//!
//! The harness does not implement perceptual hashing; it consumes it through
//! the [`Fingerprinter`] seam. The default implementation delegates to
//! `image_hasher` and classifies two images as duplicates when the Hamming
//! distance between their hashes is within a threshold.

use crate::error::ToolError;
use image_hasher::{HashAlg, HasherConfig};
use std::path::Path;

/// Opaque perceptual hash bits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Wrap raw hash bytes
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw hash bytes
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hamming distance; hashes of different lengths are maximally distant
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        if self.0.len() != other.0.len() {
            return u32::MAX;
        }
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Perceptual fingerprinting capability
#[cfg_attr(test, mockall::automock)]
pub trait Fingerprinter: Send + Sync {
    /// Compute the fingerprint of the image at `path`
    ///
    /// # Errors
    /// The image cannot be read or decoded
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ToolError>;

    /// Whether two fingerprints belong to visually duplicate images
    fn is_duplicate(&self, a: &Fingerprint, b: &Fingerprint) -> bool;
}

/// Gradient-hash fingerprinter backed by `image_hasher`
#[derive(Debug, Clone, Copy)]
pub struct GradientFingerprinter {
    threshold: u32,
}

impl GradientFingerprinter {
    /// Create fingerprinter with a duplicate distance threshold
    #[inline]
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Duplicate distance threshold
    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for GradientFingerprinter {
    fn default() -> Self {
        Self::new(15)
    }
}

impl Fingerprinter for GradientFingerprinter {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ToolError> {
        let image = decode(path).map_err(|e| ToolError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(8, 8)
            .to_hasher();
        Ok(Fingerprint::from_bytes(hasher.hash_image(&image).as_bytes()))
    }

    fn is_duplicate(&self, a: &Fingerprint, b: &Fingerprint) -> bool {
        a.distance(b) <= self.threshold
    }
}

fn decode(path: &Path) -> Result<image::DynamicImage, image::ImageError> {
    image::ImageReader::open(path)?.with_guessed_format()?.decode()
}
