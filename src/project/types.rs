//! Placement and field types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ProjectError;

// ============================================================================
// Defaults
// ============================================================================

/// Default font size in preview pixels
pub const DEFAULT_FONT_SIZE: f32 = 14.0;

/// Default line height multiplier
pub const DEFAULT_LINE_HEIGHT: f32 = 1.2;

/// Default fill color
pub const DEFAULT_COLOR: &str = "#0f172a";

// ============================================================================
// Field identity
// ============================================================================

/// Stable identifier of one placement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    /// Allocate a fresh id
    pub fn generate() -> Self {
        Self(format!("f_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<String> for FieldId {
    fn from(value: String) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Color
// ============================================================================

/// 8-bit RGB fill color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// The color used when a stored color cannot be parsed
    pub const fn fallback() -> Self {
        Self::new(0x0f, 0x17, 0x2a)
    }

    /// Components in the 0..=1 range used by PDF `rg`
    pub fn unit(&self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ProjectError;

    /// Accepts `#rgb`, `#rrggbb` (leading `#` optional)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProjectError::InvalidColor(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(invalid()),
        };

        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

// ============================================================================
// Placement
// ============================================================================

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

fn default_line_height() -> f32 {
    DEFAULT_LINE_HEIGHT
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// One positioned instance of a tag's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Logical field name; the value is looked up by tag
    #[serde(default)]
    pub tag: String,

    /// 0-based page index
    #[serde(default)]
    pub page: usize,

    /// Left edge in preview pixels
    #[serde(default)]
    pub x: f32,

    /// First-line baseline in preview pixels (top-down)
    #[serde(default)]
    pub y: f32,

    /// Font size in preview pixels
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Hex color as persisted; parsed at draw time
    #[serde(default = "default_color")]
    pub color: String,

    /// Line advance as a multiple of `font_size`
    #[serde(default = "default_line_height")]
    pub line_height: f32,

    /// Extra advance between glyphs in preview pixels
    #[serde(default)]
    pub letter_spacing: f32,
}

impl Placement {
    /// New placement with default style
    pub fn new(tag: impl Into<String>, page: usize, x: f32, y: f32, font_size: f32) -> Self {
        Self {
            tag: tag.into(),
            page,
            x,
            y,
            font_size,
            color: default_color(),
            line_height: DEFAULT_LINE_HEIGHT,
            letter_spacing: 0.0,
        }
    }

    /// Parsed fill color
    pub fn rgb(&self) -> Result<Rgb, ProjectError> {
        self.color.parse()
    }

    /// Line advance in preview pixels
    pub fn line_advance(&self) -> f32 {
        let multiplier = if self.line_height.is_finite() && self.line_height > 0.0 {
            self.line_height
        } else {
            DEFAULT_LINE_HEIGHT
        };
        self.font_size * multiplier
    }

    /// Check that the geometry can be drawn at all
    pub fn check_drawable(&self) -> Result<(), ProjectError> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(ProjectError::InvalidGeometry(format!(
                "non-finite position ({}, {})",
                self.x, self.y
            )));
        }
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(ProjectError::InvalidGeometry(format!(
                "font size {} is not positive",
                self.font_size
            )));
        }
        if !self.letter_spacing.is_finite() {
            return Err(ProjectError::InvalidGeometry(
                "non-finite letter spacing".to_string(),
            ));
        }
        Ok(())
    }
}
