//! Scenario errors

use rsat_core::{ArchiveError, CaptureError, HarnessError, MismatchError, TransformError};
use rsat_fixtures::FixtureError;
use thiserror::Error;

/// Errors raised by scenario steps
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Engine error: transform, tool, mismatch, archive or capture
    #[error(transparent)]
    Harness(#[from] HarnessError),

    /// Fixture lookup or upload failed
    #[error("fixture error: {0}")]
    Fixture(#[from] FixtureError),

    /// The request never produced a response
    #[error("request to {url} failed: {source}")]
    Http {
        /// Full request URL
        url: String,
        /// Transport error
        #[source]
        source: reqwest::Error,
    },

    /// The scenario itself is wrong: unknown requirement, missing subject
    #[error("test error: {0}")]
    Step(String),

    /// An expectation about the response did not hold
    #[error("{0}")]
    Assertion(String),
}

impl ScenarioError {
    /// Create step error
    #[must_use]
    pub fn step(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }

    /// Create assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Whether this is an expected test failure rather than a harness fault
    #[must_use]
    pub fn is_assertion_failure(&self) -> bool {
        match self {
            Self::Assertion(_) => true,
            Self::Harness(e) => e.is_assertion_failure(),
            _ => false,
        }
    }
}

impl From<CaptureError> for ScenarioError {
    fn from(e: CaptureError) -> Self {
        Self::Harness(e.into())
    }
}

impl From<MismatchError> for ScenarioError {
    fn from(e: MismatchError) -> Self {
        Self::Harness(e.into())
    }
}

impl From<ArchiveError> for ScenarioError {
    fn from(e: ArchiveError) -> Self {
        Self::Harness(e.into())
    }
}

impl From<TransformError> for ScenarioError {
    fn from(e: TransformError) -> Self {
        Self::Harness(e.into())
    }
}

/// Result type alias for scenario steps
pub type ScenarioResult<T> = Result<T, ScenarioError>;
