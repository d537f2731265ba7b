//! Preview artifacts and the render seam used by the page cache

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use serde::Serialize;

use crate::project::FieldId;
use crate::session::SessionResult;

use super::error::PreviewResult;

/// Where the preview bitmap lives
#[derive(Debug, Clone)]
pub enum BitmapRef {
    /// PNG bytes from a fresh render
    Png(Arc<Vec<u8>>),
    /// PNG file in the disk tier
    File(PathBuf),
}

impl BitmapRef {
    /// Same underlying bitmap (pointer equality for memory, path for disk)
    pub fn same_as(&self, other: &BitmapRef) -> bool {
        match (self, other) {
            (BitmapRef::Png(a), BitmapRef::Png(b)) => Arc::ptr_eq(a, b),
            (BitmapRef::File(a), BitmapRef::File(b)) => a == b,
            _ => false,
        }
    }

    /// Load the PNG bytes, reading the disk tier when needed
    pub fn load(&self) -> std::io::Result<Vec<u8>> {
        match self {
            BitmapRef::Png(bytes) => Ok(bytes.as_ref().clone()),
            BitmapRef::File(path) => std::fs::read(path),
        }
    }
}

/// A displayable preview of one page
#[derive(Debug, Clone)]
pub struct PreviewArtifact {
    pub page_index: usize,
    pub bitmap: BitmapRef,
    pub width_px: u32,
    pub height_px: u32,
}

/// Output of one compositor run
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub warnings: Vec<RenderWarning>,
}

/// Something that went wrong without failing the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWarning {
    /// The page itself failed to rasterize; a blank placeholder was used
    PagePlaceholder { page: usize, reason: String },
    /// A placement was not drawn
    PlacementSkipped { field: FieldId, reason: String },
    /// A placement's color was unusable; the default color was used
    ColorFallback { field: FieldId, color: String },
}

/// Renders full preview pages for the cache
///
/// Called from blocking worker threads; implementations serialize their own
/// access to non-thread-safe resources.
pub trait PageSource: Send + Sync {
    /// Pixel size of a page without rendering it
    fn display_size(&self, page: usize) -> (u32, u32);

    /// Render page content plus overlay and encode it as PNG
    fn render_page(&self, page: usize) -> PreviewResult<RenderedPage>;
}

/// Raw page rasters without any overlay
pub trait PageRaster: Send + Sync {
    /// Best-guess pixel size of a page at `dpi`
    fn display_size(&self, page: usize, dpi: f32) -> (u32, u32);

    fn raw_page_bitmap(&self, page: usize, dpi: f32) -> SessionResult<RgbaImage>;
}
