//! Transformation specifications
//!
//! [`TransformSpec`] is the strictly-parsed form of a human attribute table
//! (`Width`, `Height`, `Resize Method`, `Gravity`, `Format`). Parsing consumes
//! every key it understands and rejects whatever is left, so an unimplemented
//! transformation can never be silently ignored.

use crate::error::TransformError;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Attribute key for target width
pub const WIDTH: &str = "Width";
/// Attribute key for target height
pub const HEIGHT: &str = "Height";
/// Attribute key for the resize method
pub const RESIZE_METHOD: &str = "Resize Method";
/// Attribute key for crop gravity
pub const GRAVITY: &str = "Gravity";
/// Attribute key for output format
pub const FORMAT: &str = "Format";

/// Crop anchor on the 9-point compass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Gravity {
    /// `C`
    #[default]
    Center,
    /// `N`
    North,
    /// `NE`
    NorthEast,
    /// `E`
    East,
    /// `SE`
    SouthEast,
    /// `S`
    South,
    /// `SW`
    SouthWest,
    /// `W`
    West,
    /// `NW`
    NorthWest,
}

impl Gravity {
    /// All gravities, in compass order starting from the center
    pub const ALL: [Gravity; 9] = [
        Self::Center,
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
    ];

    /// Short compass code (`C`, `N`, `NE`, ...)
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Center => "C",
            Self::North => "N",
            Self::NorthEast => "NE",
            Self::East => "E",
            Self::SouthEast => "SE",
            Self::South => "S",
            Self::SouthWest => "SW",
            Self::West => "W",
            Self::NorthWest => "NW",
        }
    }

    /// Name understood by ImageMagick's `-gravity`
    #[must_use]
    pub const fn magick_name(self) -> &'static str {
        match self {
            Self::Center => "Center",
            Self::North => "North",
            Self::NorthEast => "NorthEast",
            Self::East => "East",
            Self::SouthEast => "SouthEast",
            Self::South => "South",
            Self::SouthWest => "SouthWest",
            Self::West => "West",
            Self::NorthWest => "NorthWest",
        }
    }
}

impl FromStr for Gravity {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.code() == s)
            .ok_or_else(|| TransformError::invalid_value(GRAVITY, s))
    }
}

/// Target geometry; either side may be left for the tool to derive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Geometry {
    /// Geometry with both sides fixed
    #[inline]
    #[must_use]
    pub const fn exact(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }
}

impl Display for Geometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(w) = self.width {
            write!(f, "{w}")?;
        }
        f.write_str("x")?;
        if let Some(h) = self.height {
            write!(f, "{h}")?;
        }
        Ok(())
    }
}

/// Resize step, one variant per `Resize Method`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resize {
    /// No width or height given
    None,
    /// Fit within the geometry, keeping aspect ratio
    Scale(Geometry),
    /// Fill the geometry then crop to exactly it, anchored at the gravity
    Crop {
        width: u32,
        height: u32,
        gravity: Gravity,
    },
    /// Force exactly the geometry, ignoring aspect ratio
    Stretch { width: u32, height: u32 },
}

/// Fully parsed transformation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformSpec {
    pub resize: Resize,
    /// Lower-cased output format (file extension), when converting
    pub format: Option<String>,
}

impl TransformSpec {
    /// Identity transformation
    #[inline]
    #[must_use]
    pub fn identity() -> Self {
        Self {
            resize: Resize::None,
            format: None,
        }
    }

    /// Parse a human attribute table
    ///
    /// # Errors
    /// - `UnsupportedParameter` when keys remain after parsing
    /// - `InvalidValue` for non-numeric sizes, unknown methods or gravities
    /// - `MissingDimension` when Crop or Stretch lack a side
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Result<Self, TransformError> {
        let mut remaining = attributes.clone();

        let width = take_dimension(&mut remaining, WIDTH)?;
        let height = take_dimension(&mut remaining, HEIGHT)?;
        let method = remaining.remove(RESIZE_METHOD);

        let resize = match method.as_deref() {
            None | Some("Scale") => {
                if width.is_some() || height.is_some() {
                    Resize::Scale(Geometry { width, height })
                } else {
                    Resize::None
                }
            }
            Some("Crop") => {
                let gravity = match remaining.remove(GRAVITY) {
                    Some(code) => code.parse()?,
                    None => Gravity::Center,
                };
                let (width, height) = both(width, height, "Crop")?;
                Resize::Crop {
                    width,
                    height,
                    gravity,
                }
            }
            Some("Stretch") => {
                let (width, height) = both(width, height, "Stretch")?;
                Resize::Stretch { width, height }
            }
            Some(other) => return Err(TransformError::invalid_value(RESIZE_METHOD, other)),
        };

        let format = remaining.remove(FORMAT).map(|f| f.to_lowercase());

        if !remaining.is_empty() {
            return Err(TransformError::UnsupportedParameter {
                keys: remaining.into_keys().collect(),
            });
        }

        Ok(Self { resize, format })
    }

    /// Operator arguments for `mogrify`, without the tool name or target path
    #[must_use]
    pub fn mogrify_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.resize {
            Resize::None => {}
            Resize::Scale(geometry) => {
                args.push("-resize".to_string());
                args.push(geometry.to_string());
            }
            Resize::Crop {
                width,
                height,
                gravity,
            } => {
                let geometry = Geometry::exact(width, height);
                args.push("-thumbnail".to_string());
                args.push(format!("{geometry}^"));
                args.push("-extent".to_string());
                args.push(geometry.to_string());
                args.push("-gravity".to_string());
                args.push(gravity.magick_name().to_string());
            }
            Resize::Stretch { width, height } => {
                args.push("-resize".to_string());
                args.push(format!("{}!", Geometry::exact(width, height)));
            }
        }
        if let Some(format) = &self.format {
            args.push("-format".to_string());
            args.push(format.clone());
        }
        args
    }

    /// Check if nothing would be changed
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.resize == Resize::None && self.format.is_none()
    }
}

fn take_dimension(
    remaining: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<u32>, TransformError> {
    remaining
        .remove(key)
        .map(|value| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| TransformError::invalid_value(key, value.clone()))
        })
        .transpose()
}

fn both(
    width: Option<u32>,
    height: Option<u32>,
    method: &'static str,
) -> Result<(u32, u32), TransformError> {
    match (width, height) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(TransformError::MissingDimension { method }),
    }
}
