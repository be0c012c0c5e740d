//! External raster tooling
//!
//! [`RasterTool`] drives ImageMagick's `mogrify` and `identify` as
//! subprocesses. Every invocation is bounded by a timeout; a hung tool
//! surfaces as [`ToolError::Timeout`] instead of hanging the scenario.

use crate::config::RasterConfig;
use crate::error::ToolError;
use async_trait::async_trait;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimensions {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s.trim().split_once('x').ok_or(())?;
        Ok(Self::new(w.parse().map_err(|_| ())?, h.parse().map_err(|_| ())?))
    }
}

/// Source of pixel dimensions for an image file
#[async_trait]
pub trait DimensionProbe: Send + Sync {
    /// Read the dimensions of the image at `path`
    async fn dimensions(&self, path: &Path) -> Result<Dimensions, ToolError>;
}

/// ImageMagick subprocess runner
#[derive(Debug, Clone)]
pub struct RasterTool {
    config: RasterConfig,
    timeout: Duration,
}

impl RasterTool {
    /// Create runner with tool names and per-call timeout
    #[inline]
    #[must_use]
    pub fn new(config: RasterConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Per-call timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `mogrify <args> <path>`, altering the file in place
    ///
    /// # Errors
    /// Spawn failure, non-zero exit, or timeout
    pub async fn mogrify(&self, args: &[String], path: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.config.mogrify);
        cmd.args(args).arg(path);
        self.run(&self.config.mogrify, cmd).await.map(|_| ())
    }

    /// Run `identify -format %wx%h <path>[0]`
    ///
    /// # Errors
    /// Spawn failure, non-zero exit, timeout, or output that is not `WxH`
    pub async fn identify(&self, path: &Path) -> Result<Dimensions, ToolError> {
        let mut target = path.as_os_str().to_owned();
        target.push("[0]");

        let mut cmd = Command::new(&self.config.identify);
        cmd.args(["-format", "%wx%h"]).arg(target);
        let stdout = self.run(&self.config.identify, cmd).await?;

        stdout.parse().map_err(|()| ToolError::UnparseableOutput {
            tool: self.config.identify.clone(),
            output: stdout,
        })
    }

    /// Check whether both tools can be started
    pub async fn is_available(&self) -> bool {
        for tool in [&self.config.mogrify, &self.config.identify] {
            let mut cmd = Command::new(tool);
            cmd.arg("-version");
            if self.run(tool, cmd).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn run(&self, tool: &str, mut cmd: Command) -> Result<String, ToolError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool, ?cmd, "running raster tool");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ToolError::timeout(tool, self.timeout))?
            .map_err(|source| ToolError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Exit {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DimensionProbe for RasterTool {
    async fn dimensions(&self, path: &Path) -> Result<Dimensions, ToolError> {
        self.identify(path).await
    }
}

/// Dimension probe reading image headers in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProbe;

#[async_trait]
impl DimensionProbe for HeaderProbe {
    async fn dimensions(&self, path: &Path) -> Result<Dimensions, ToolError> {
        let owned: PathBuf = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || read_header(&owned))
            .await
            .map_err(|e| ToolError::Worker {
                tool: "image-header".to_string(),
                message: e.to_string(),
            })?;

        result
            .map(|(width, height)| Dimensions::new(width, height))
            .map_err(|e| ToolError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn read_header(path: &Path) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()
}
