//! RSAT Fixtures - test data for resource-server scenarios
//!
//! - [`FixtureStore`]: a YAML manifest of fixture assets, looked up by
//!   object type and a "which" qualifier
//! - [`UploadSession`]: places fixtures on the server's ingest mount under a
//!   per-run folder and removes that folder again

#![warn(unreachable_pub)]

pub mod error;
pub mod store;
pub mod upload;

pub use error::{FixtureError, FixtureResult};
pub use store::{subject_name, FixtureEntry, FixtureStore, Which, MANIFEST_FILE};
pub use upload::{UploadSession, FOLDER_PREFIX};
