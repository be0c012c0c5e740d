//! Harness configuration
//!
//! [`HarnessConfig`] is read from a TOML file (named by `RSAT_CONFIG`) with
//! environment overrides for the values that differ between CI and local runs.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "RSAT_CONFIG";
/// Environment override for the resource server base URL
pub const RESOURCE_SERVER_ENV: &str = "RSAT_RESOURCE_SERVER";
/// Environment override for the server's ingest mount
pub const MOUNT_DIR_ENV: &str = "RSAT_MOUNT_DIR";
/// Environment override for the HTTP proxy; empty disables it
pub const PROXY_ENV: &str = "RSAT_PROXY";

/// Names of the ImageMagick binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// In-place transformer
    pub mogrify: String,
    /// Dimension introspection
    pub identify: String,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            mogrify: "mogrify".to_string(),
            identify: "identify".to_string(),
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the resource server under test
    pub resource_server: String,
    /// Proxy every request to the resource server goes through
    pub proxy: Option<String>,
    /// Directory the resource server ingests assets from
    pub mount_dir: PathBuf,
    /// Root of the fixture data tree
    pub data_dir: PathBuf,
    /// Where diagnostic copies of mismatched artifacts are written
    pub diagnostics_dir: PathBuf,
    /// ImageMagick binaries
    pub raster: RasterConfig,
    /// Bound on each external tool call, in seconds
    pub tool_timeout_secs: u64,
    /// Bound on each HTTP request, in seconds
    pub request_timeout_secs: u64,
    /// Largest fingerprint distance still classified as a duplicate
    pub duplicate_threshold: u32,
}

impl HarnessConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With resource server base URL
    #[inline]
    #[must_use]
    pub fn with_resource_server(mut self, url: impl Into<String>) -> Self {
        self.resource_server = url.into();
        self
    }

    /// With HTTP proxy
    #[inline]
    #[must_use]
    pub fn with_proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    /// With ingest mount directory
    #[inline]
    #[must_use]
    pub fn with_mount_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mount_dir = dir.into();
        self
    }

    /// With fixture data directory
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// With diagnostics directory
    #[inline]
    #[must_use]
    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = dir.into();
        self
    }

    /// With tool timeout
    #[inline]
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With duplicate threshold
    #[inline]
    #[must_use]
    pub fn with_duplicate_threshold(mut self, threshold: u32) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    /// Tool timeout as a duration
    #[inline]
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Request timeout as a duration
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Read configuration from a TOML file; missing keys take defaults
    ///
    /// # Errors
    /// IO failure or invalid TOML
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `RSAT_CONFIG` (when set) and apply environment overrides
    ///
    /// # Errors
    /// See [`HarnessConfig::from_toml_file`]
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.apply_env_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from a variable lookup
    ///
    /// # Errors
    /// An override that is present but empty
    pub fn apply_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(RESOURCE_SERVER_ENV) {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: RESOURCE_SERVER_ENV.to_string(),
                    message: "empty URL".to_string(),
                });
            }
            self.resource_server = url;
        }
        if let Some(dir) = lookup(MOUNT_DIR_ENV) {
            if dir.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: MOUNT_DIR_ENV.to_string(),
                    message: "empty path".to_string(),
                });
            }
            self.mount_dir = PathBuf::from(dir);
        }
        if let Some(proxy) = lookup(PROXY_ENV) {
            let proxy = proxy.trim();
            self.proxy = (!proxy.is_empty()).then(|| proxy.to_string());
        }
        Ok(self)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            resource_server: "http://localhost:8080".to_string(),
            proxy: None,
            mount_dir: PathBuf::from("/mnt/resource-server"),
            data_dir: PathBuf::from("features/support/data"),
            diagnostics_dir: std::env::temp_dir(),
            raster: RasterConfig::default(),
            tool_timeout_secs: 30,
            request_timeout_secs: 30,
            duplicate_threshold: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsat.toml");
        std::fs::write(
            &path,
            "resource_server = \"http://rs.test:9000\"\n\n[raster]\nmogrify = \"/opt/im/mogrify\"\n",
        )
        .unwrap();

        let config = HarnessConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.resource_server, "http://rs.test:9000");
        assert_eq!(config.raster.mogrify, "/opt/im/mogrify");
        assert_eq!(config.raster.identify, "identify");
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
        assert_eq!(config.duplicate_threshold, 15);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsat.toml");
        std::fs::write(&path, "tool_timeout_secs = \"soon\"").unwrap();

        assert!(matches!(
            HarnessConfig::from_toml_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let config = HarnessConfig::new()
            .apply_env_overrides(|var| match var {
                RESOURCE_SERVER_ENV => Some("http://ci:8080".to_string()),
                MOUNT_DIR_ENV => Some("/srv/ingest".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.resource_server, "http://ci:8080");
        assert_eq!(config.mount_dir, PathBuf::from("/srv/ingest"));
    }

    #[test]
    fn proxy_from_file_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsat.toml");
        std::fs::write(&path, "proxy = \"http://squid:3128\"\n").unwrap();
        let config = HarnessConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.proxy.as_deref(), Some("http://squid:3128"));

        let overridden = config
            .clone()
            .apply_env_overrides(|var| {
                (var == PROXY_ENV).then(|| "http://ci-proxy:8080".to_string())
            })
            .unwrap();
        assert_eq!(overridden.proxy.as_deref(), Some("http://ci-proxy:8080"));

        let disabled = config
            .apply_env_overrides(|var| (var == PROXY_ENV).then(String::new))
            .unwrap();
        assert_eq!(disabled.proxy, None);
        assert_eq!(HarnessConfig::default().proxy, None);
    }

    #[test]
    fn empty_override_is_rejected() {
        let result = HarnessConfig::new().apply_env_overrides(|var| {
            (var == RESOURCE_SERVER_ENV).then(|| "  ".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }
}
