//! HTTP access to the resource server

use crate::error::{ScenarioError, ScenarioResult};
use rsat_core::{CapturedResponse, HarnessConfig};
use std::time::Duration;

/// Thin GET client bound to the resource server's base URL
///
/// Redirects are not followed; a `3xx` is captured like any other response.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ResourceClient {
    /// Create client for `base_url`
    ///
    /// # Errors
    /// The underlying client cannot be built
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ScenarioResult<Self> {
        Self::build(base_url.into(), timeout, None)
    }

    /// Create client for `base_url` sending every request through `proxy`
    ///
    /// # Errors
    /// The proxy URL is invalid or the underlying client cannot be built
    pub fn with_proxy(
        base_url: impl Into<String>,
        timeout: Duration,
        proxy: &str,
    ) -> ScenarioResult<Self> {
        Self::build(base_url.into(), timeout, Some(proxy))
    }

    /// Client for the configured resource server and proxy
    ///
    /// # Errors
    /// The proxy URL is invalid or the underlying client cannot be built
    pub fn from_config(config: &HarnessConfig) -> ScenarioResult<Self> {
        Self::build(
            config.resource_server.clone(),
            config.request_timeout(),
            config.proxy.as_deref(),
        )
    }

    fn build(base_url: String, timeout: Duration, proxy: Option<&str>) -> ScenarioResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|source| ScenarioError::Http {
                url: proxy.to_string(),
                source,
            })?;
            builder = builder.proxy(proxy);
            tracing::debug!(base = %base_url, "requests go through proxy");
        }
        let http = builder.build().map_err(|source| ScenarioError::Http {
            url: base_url.clone(),
            source,
        })?;
        Ok(Self { http, base_url })
    }

    /// Base URL without trailing slash
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a request path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` with extra headers and capture the whole response
    ///
    /// # Errors
    /// Connection failure, timeout, or a broken body stream
    pub async fn get(
        &self,
        path: &str,
        headers: &[(&str, String)],
    ) -> ScenarioResult<CapturedResponse> {
        let url = self.url(path);
        let http_error = |source| ScenarioError::Http {
            url: url.clone(),
            source,
        };

        let mut request = self.http.get(&url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request.send().await.map_err(http_error)?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(http_error)?.to_vec();

        tracing::info!(%url, status, bytes = body.len(), "GET");
        Ok(CapturedResponse::new(status, response_headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_without_doubling_slashes() {
        let client =
            ResourceClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url("/params;v=0/rs-test-A/a.png"),
            "http://localhost:8080/params;v=0/rs-test-A/a.png"
        );
        assert_eq!(client.url("a.png"), "http://localhost:8080/a.png");
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let proxy = "ftp://proxy.test:21";
        let err = ResourceClient::with_proxy("http://localhost:8080", Duration::from_secs(1), proxy)
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Http { url, .. } if url == proxy));
    }

    #[tokio::test]
    async fn requests_go_through_configured_proxy() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.bin"), b"via proxy").unwrap();
        let server = rsat_test_utils::MockResourceServer::start(root.path());

        // Unresolvable host: only the proxy can answer
        let config = HarnessConfig::new()
            .with_resource_server("http://resource-server.invalid")
            .with_proxy(server.url());
        let response = ResourceClient::from_config(&config)
            .unwrap()
            .get("/a.bin", &[])
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"via proxy");
    }
}
