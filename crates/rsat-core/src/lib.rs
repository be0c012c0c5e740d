//! RSAT Core - response validation for resource-server acceptance tests
//!
//! The engine behind every scenario step that checks what the server sent:
//! - Encodes transformation parameters into the canonical `params;` path segment
//! - Replicates declared transformations independently with ImageMagick
//! - Compares responses byte-for-byte or perceptually, by asset kind
//! - Extracts members from ePub containers
//! - Holds the single captured response of a scenario
//!
//! # Example
//!
//! ```rust,ignore
//! use rsat_core::prelude::*;
//!
//! # async fn example(body: Vec<u8>) -> HarnessResult<()> {
//! let config = HarnessConfig::load()?;
//! let replicator = TransformReplicator::new(RasterTool::new(
//!     config.raster.clone(),
//!     config.tool_timeout(),
//! ));
//! let comparator = AssetComparator::from_config(&config);
//!
//! let spec = TransformSpec::from_attributes(&[
//!     ("Width".to_string(), "200".to_string()),
//! ].into_iter().collect())?;
//! let expected = replicator
//!     .replicate(SourceImage::Path("fixtures/cover.jpg".as_ref()), &spec)
//!     .await?;
//! comparator
//!     .compare_visual(expected.path(), &body, VisualOptions::default())
//!     .await?
//!     .into_result()?;
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod archive;
pub mod asset;
pub mod capture;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod params;
pub mod raster;
pub mod replicate;
pub mod transform;

// Re-exports for convenience
pub use archive::ArchiveExtractor;
pub use asset::{AssetKind, AssetRecord};
pub use capture::{CapturedResponse, ResponseCapture};
pub use compare::{expected_range, AssetComparator, ComparisonVerdict, Strategy, VisualOptions};
pub use config::{HarnessConfig, RasterConfig};
pub use diagnostics::DiagnosticSink;
pub use error::{
    ArchiveError, ArtifactPaths, CaptureError, ConfigError, HarnessError, HarnessResult,
    MismatchError, ToolError, TransformError,
};
pub use fingerprint::{Fingerprint, Fingerprinter, GradientFingerprinter};
pub use logging::{init_logging, LogFormat};
pub use params::{ParamsParseError, TransformParams};
pub use raster::{DimensionProbe, Dimensions, HeaderProbe, RasterTool};
pub use replicate::{ReplicatedImage, SourceImage, TransformReplicator};
pub use transform::{Geometry, Gravity, Resize, TransformSpec};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing scenario steps
    pub use crate::{
        AssetComparator, AssetKind, AssetRecord, CapturedResponse, HarnessConfig, HarnessError,
        HarnessResult, RasterTool, ResponseCapture, SourceImage, TransformParams,
        TransformReplicator, TransformSpec, VisualOptions,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
