//! Typed partial updates of a placement

use serde::{Deserialize, Serialize};

use super::error::{ProjectError, ProjectResult};
use super::types::{Placement, Rgb};

/// Partial placement update; `None` leaves the attribute unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FieldPatch {
    pub fn position(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Validate every present attribute against `page_count`
    pub fn validate(&self, page_count: usize) -> ProjectResult<()> {
        for (attribute, value) in [("x", self.x), ("y", self.y)] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ProjectError::InvalidAttribute {
                        attribute,
                        reason: format!("{v} is not finite"),
                    });
                }
            }
        }

        if let Some(page) = self.page {
            if page >= page_count {
                return Err(ProjectError::PageOutOfRange { page, page_count });
            }
        }

        if let Some(size) = self.font_size {
            if !size.is_finite() || size <= 0.0 {
                return Err(ProjectError::InvalidAttribute {
                    attribute: "font_size",
                    reason: format!("{size} must be > 0"),
                });
            }
        }

        if let Some(color) = &self.color {
            color.parse::<Rgb>()?;
        }

        if let Some(lh) = self.line_height {
            if !lh.is_finite() || lh <= 0.0 {
                return Err(ProjectError::InvalidAttribute {
                    attribute: "line_height",
                    reason: format!("{lh} must be > 0"),
                });
            }
        }

        if let Some(ls) = self.letter_spacing {
            if !ls.is_finite() {
                return Err(ProjectError::InvalidAttribute {
                    attribute: "letter_spacing",
                    reason: format!("{ls} is not finite"),
                });
            }
        }

        if let Some(tag) = &self.tag {
            if tag.trim().is_empty() {
                return Err(ProjectError::MissingTag);
            }
        }

        Ok(())
    }

    /// Apply an already validated patch
    pub(crate) fn apply_to(&self, placement: &mut Placement) {
        if let Some(x) = self.x {
            placement.x = x;
        }
        if let Some(y) = self.y {
            placement.y = y;
        }
        if let Some(page) = self.page {
            placement.page = page;
        }
        if let Some(size) = self.font_size {
            placement.font_size = size;
        }
        if let Some(color) = &self.color {
            // Store normalized so later parses cannot diverge
            if let Ok(rgb) = color.parse::<Rgb>() {
                placement.color = rgb.to_hex();
            }
        }
        if let Some(lh) = self.line_height {
            placement.line_height = lh;
        }
        if let Some(ls) = self.letter_spacing {
            placement.letter_spacing = ls;
        }
        if let Some(tag) = &self.tag {
            placement.tag = tag.trim().to_string();
        }
    }
}
