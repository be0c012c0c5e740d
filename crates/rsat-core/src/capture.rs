//! Captured HTTP responses
//!
//! [`ResponseCapture`] is a single slot holding the most recent response of a
//! scenario. It is owned by the scenario's execution context, so "exactly one
//! active response" is enforced by ownership rather than a shared global.

use crate::error::CaptureError;
use std::collections::BTreeMap;

/// Status, headers and body of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    /// Header names are stored lower-cased
    headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl CapturedResponse {
    /// Create response from parts; header names are folded to lower case
    #[must_use]
    pub fn new<K, V>(status: u16, headers: impl IntoIterator<Item = (K, V)>, body: Vec<u8>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body,
        }
    }

    /// Header value, looked up case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, lower-cased names
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// `Content-Type` without parameters
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }
}

/// Single-slot buffer for the last response of a scenario
#[derive(Debug, Default)]
pub struct ResponseCapture {
    last: Option<CapturedResponse>,
}

impl ResponseCapture {
    /// Create empty capture
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a response, replacing any previous one
    pub fn capture(&mut self, response: CapturedResponse) {
        tracing::debug!(
            status = response.status,
            bytes = response.body.len(),
            "captured response"
        );
        self.last = Some(response);
    }

    /// The most recent response
    ///
    /// # Errors
    /// `NoResponseCaptured` before the first request of the scenario
    pub fn last(&self) -> Result<&CapturedResponse, CaptureError> {
        self.last.as_ref().ok_or(CaptureError::NoResponseCaptured)
    }

    /// Remove and return the most recent response
    ///
    /// # Errors
    /// `NoResponseCaptured` when the slot is empty
    pub fn take(&mut self) -> Result<CapturedResponse, CaptureError> {
        self.last.take().ok_or(CaptureError::NoResponseCaptured)
    }

    /// Clear the slot at scenario start
    #[inline]
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Check if a response is held
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &[u8]) -> CapturedResponse {
        CapturedResponse::new(
            status,
            [
                ("Content-Type", "image/jpeg; charset=binary"),
                ("Content-Location", "/params;v=0/a.jpg"),
            ],
            body.to_vec(),
        )
    }

    #[test]
    fn empty_capture_fails() {
        let capture = ResponseCapture::new();
        assert!(matches!(capture.last(), Err(CaptureError::NoResponseCaptured)));
    }

    #[test]
    fn capture_overwrites_previous() {
        let mut capture = ResponseCapture::new();
        capture.capture(response(200, b"first"));
        capture.capture(response(404, b"second"));

        let last = capture.last().unwrap();
        assert_eq!(last.status, 404);
        assert_eq!(last.body, b"second");
    }

    #[test]
    fn reset_clears_slot() {
        let mut capture = ResponseCapture::new();
        capture.capture(response(200, b"body"));
        capture.reset();
        assert!(capture.is_empty());
        assert!(capture.take().is_err());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let resp = response(200, b"");
        assert_eq!(resp.header("content-location"), Some("/params;v=0/a.jpg"));
        assert_eq!(resp.header("Content-location"), Some("/params;v=0/a.jpg"));
        assert_eq!(resp.content_type(), Some("image/jpeg"));
        assert_eq!(resp.header("etag"), None);
    }
}
