//! Coordinate transforms between document points and preview pixels
//!
//! Document space is measured in PDF points (1/72 inch) with the origin at
//! the bottom-left of the page box. Preview space is measured in pixels at a
//! fixed DPI with the origin at the top-left.
//!
//! A placement's `y` is the baseline of its first line. The only place that
//! flips the vertical axis for export is [`PagePoint::from_preview`]; the
//! preview path draws at the pixel baseline directly.
//!
//! Previews show a page as displayed, after its `/Rotate`. Preview positions
//! are therefore mapped through the inverse rotation onto the unrotated box.

use serde::{Deserialize, Serialize};

/// Points per inch in PDF user space
pub const POINTS_PER_INCH: f32 = 72.0;

/// Resolution of preview rasters and of the placement coordinate system
pub const PREVIEW_DPI: f32 = 150.0;

/// Convert a length in points to pixels at `dpi`
pub fn pt_to_px(value_pt: f32, dpi: f32) -> f32 {
    value_pt / POINTS_PER_INCH * dpi
}

/// Convert a length in pixels at `dpi` to points
pub fn px_to_pt(value_px: f32, dpi: f32) -> f32 {
    value_px * POINTS_PER_INCH / dpi
}

/// Mirror a coordinate inside an extent (`extent - value`)
pub fn flip_vertical(value: f32, extent: f32) -> f32 {
    extent - value
}

/// Page size in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
        }
    }

    /// Pixel dimensions of this page rendered at `dpi`, never smaller than 1x1
    pub fn to_pixels(&self, dpi: f32) -> (u32, u32) {
        let w = pt_to_px(self.width_pt, dpi).round().max(1.0);
        let h = pt_to_px(self.height_pt, dpi).round().max(1.0);
        (w as u32, h as u32)
    }
}

/// A page box in PDF user space (`[x0 y0 x1 y1]`) plus the page's `/Rotate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// Clockwise display rotation: 0, 90, 180 or 270
    pub rotate: u16,
}

impl PageBox {
    /// Build from an unordered PDF rectangle
    pub fn from_rect(rect: [f32; 4]) -> Self {
        Self {
            x0: rect[0].min(rect[2]),
            y0: rect[1].min(rect[3]),
            x1: rect[0].max(rect[2]),
            y1: rect[1].max(rect[3]),
            rotate: 0,
        }
    }

    /// Same box displayed with `/Rotate degrees`; values that are not a
    /// multiple of 90 are treated as 0
    pub fn with_rotation(mut self, degrees: i64) -> Self {
        let normalized = degrees.rem_euclid(360);
        self.rotate = if normalized % 90 == 0 {
            normalized as u16
        } else {
            0
        };
        self
    }

    /// Unrotated size
    pub fn size(&self) -> PageSize {
        PageSize::new(self.x1 - self.x0, self.y1 - self.y0)
    }

    /// Size as displayed, width and height swapped for quarter turns
    pub fn display_size(&self) -> PageSize {
        let size = self.size();
        match self.rotate {
            90 | 270 => PageSize::new(size.height_pt, size.width_pt),
            _ => size,
        }
    }

    /// Text space axes `[a b c d]` that read upright on the displayed page
    pub fn upright_axes(&self) -> [f32; 4] {
        match self.rotate {
            90 => [0.0, 1.0, -1.0, 0.0],
            180 => [-1.0, 0.0, 0.0, -1.0],
            270 => [0.0, -1.0, 1.0, 0.0],
            _ => [1.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Default for PageBox {
    /// US Letter
    fn default() -> Self {
        Self::from_rect([0.0, 0.0, 612.0, 792.0])
    }
}

/// A point in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

impl PagePoint {
    /// Map a preview pixel position onto the page box.
    ///
    /// Unrotated: `y_pt = page_height_pt - px_to_pt(y_px)`, offset by the box
    /// origin. Rotated pages go through the inverse of the display rotation.
    pub fn from_preview(x_px: f32, y_px: f32, page: &PageBox, dpi: f32) -> Self {
        let size = page.size();
        let (w, h) = (size.width_pt, size.height_pt);
        let dx = px_to_pt(x_px, dpi);
        let dy = px_to_pt(y_px, dpi);

        let (u, v) = match page.rotate {
            90 => (dy, dx),
            180 => (w - dx, dy),
            270 => (w - dy, h - dx),
            _ => (dx, flip_vertical(dy, h)),
        };
        Self {
            x: page.x0 + u,
            y: page.y0 + v,
        }
    }

    /// Inverse of [`PagePoint::from_preview`]
    pub fn to_preview(&self, page: &PageBox, dpi: f32) -> (f32, f32) {
        let size = page.size();
        let (w, h) = (size.width_pt, size.height_pt);
        let u = self.x - page.x0;
        let v = self.y - page.y0;

        let (dx, dy) = match page.rotate {
            90 => (v, u),
            180 => (w - u, v),
            270 => (h - v, w - u),
            _ => (u, flip_vertical(v, h)),
        };
        (pt_to_px(dx, dpi), pt_to_px(dy, dpi))
    }
}
