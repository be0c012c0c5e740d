//! RSAT Scenario - acceptance scenarios against a resource server
//!
//! Binds the response-validation engine in `rsat-core` to HTTP and to the
//! fixture store:
//! - [`ResourceClient`] issues GETs against the configured server
//! - [`Scenario`] holds one scenario's subjects and captured response and
//!   offers the given/when/then steps
//!
//! # Example
//!
//! ```rust,ignore
//! use rsat_scenario::{Scenario, ScenarioResult};
//! use rsat_core::HarnessConfig;
//!
//! # async fn example() -> ScenarioResult<()> {
//! let config = HarnessConfig::load()?;
//! let mut scenario = Scenario::new(&config)?;
//! scenario.given_asset_exists("image", None)?;
//! scenario
//!     .request_image_with_filters([("Image: Width", "200")])
//!     .await?;
//! scenario
//!     .assert_response_image_altered([("Width", "200")])
//!     .await?;
//! scenario.finish()
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod scenario;

pub use client::ResourceClient;
pub use error::{ScenarioError, ScenarioResult};
pub use scenario::{ByteRange, DownloadKind, Scenario, IMAGE, MISSING_MEMBER, SAMPLE_EPUB};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
