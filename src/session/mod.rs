//! Document session
//!
//! Owns the single live MuPDF handle for the bound template document.
//!
//! # Thread Safety
//!
//! MuPDF documents are **not** thread-safe. Every access goes through one
//! `parking_lot::Mutex`, so page geometry lookups, rasterization and
//! open/close never overlap. The handle is released before a new document is
//! opened, and before the bound file is replaced on disk, because some
//! platforms refuse to replace files that are still open.

mod error;

use std::io::Read;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::geometry::PageSize;

pub use error::{SessionError, SessionResult};

/// Pixel size reported when a page's geometry cannot be read
pub const FALLBACK_DISPLAY_SIZE: (u32, u32) = (600, 800);

/// Outcome of a successful open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub path: PathBuf,
    pub page_count: usize,
}

struct OpenDocument {
    doc: Document,
    path: PathBuf,
    page_count: usize,
}

// SAFETY: OpenDocument only lives inside `DocumentSession::handle`, whose
// mutex serializes every use of the MuPDF document. MuPDF contexts used by
// the crate on other threads are cloned from the same base context, so a
// document may be used from any thread as long as calls never overlap.
unsafe impl Send for OpenDocument {}

/// The open template document
pub struct DocumentSession {
    handle: Mutex<Option<OpenDocument>>,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSession {
    /// A session with nothing bound
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Bind `path`, closing whatever was open first.
    ///
    /// The previous handle is gone even when the new open fails.
    pub fn open(&self, path: impl AsRef<Path>) -> SessionResult<SessionInfo> {
        let path = path.as_ref().to_path_buf();
        let mut handle = self.handle.lock();

        if let Some(previous) = handle.take() {
            debug!(path = %previous.path.display(), "Closing previous document");
            drop(previous);
        }

        let open_error = |reason: String| SessionError::Open {
            path: path.clone(),
            reason,
        };

        check_pdf_magic(&path).map_err(open_error)?;

        let doc = Document::open(&*path.to_string_lossy()).map_err(|e| open_error(e.to_string()))?;
        let page_count = doc.page_count().map_err(|e| open_error(e.to_string()))?;
        let page_count = usize::try_from(page_count).unwrap_or(0);
        if page_count == 0 {
            return Err(open_error("document has no pages".to_string()));
        }

        info!(path = %path.display(), page_count, "Opened document");
        *handle = Some(OpenDocument {
            doc,
            path: path.clone(),
            page_count,
        });

        Ok(SessionInfo { path, page_count })
    }

    /// Release the handle; a no-op when nothing is open
    pub fn close(&self) {
        if let Some(previous) = self.handle.lock().take() {
            debug!(path = %previous.path.display(), "Closed document");
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Page count of the bound document (0 when nothing is open)
    pub fn page_count(&self) -> usize {
        self.handle.lock().as_ref().map_or(0, |open| open.page_count)
    }

    /// Path of the bound document
    pub fn path(&self) -> Option<PathBuf> {
        self.handle.lock().as_ref().map(|open| open.path.clone())
    }

    /// Execute a closure with the document and a range-checked page index
    fn with_page<F, R>(&self, page: usize, f: F) -> SessionResult<R>
    where
        F: FnOnce(&Document) -> SessionResult<R>,
    {
        let handle = self.handle.lock();
        let open = handle.as_ref().ok_or(SessionError::NotOpen)?;
        if page >= open.page_count {
            return Err(SessionError::PageIndex {
                page,
                page_count: open.page_count,
            });
        }
        f(&open.doc)
    }

    /// Page size in points (page box after rotation)
    pub fn page_geometry(&self, page: usize) -> SessionResult<PageSize> {
        self.with_page(page, |doc| {
            let render_error = |e: mupdf::Error| SessionError::Render {
                page,
                reason: e.to_string(),
            };
            let loaded = doc.load_page(page as i32).map_err(render_error)?;
            let bounds = loaded.bounds().map_err(render_error)?;
            Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
        })
    }

    /// Expected raster size of `page` at `dpi`, degrading to a fixed guess
    pub fn display_size(&self, page: usize, dpi: f32) -> (u32, u32) {
        match self.page_geometry(page) {
            Ok(size) => size.to_pixels(dpi),
            Err(e) => {
                warn!(page, error = %e, "Page geometry unavailable, using fallback size");
                FALLBACK_DISPLAY_SIZE
            }
        }
    }

    /// Rasterize the page content only (no overlay) on an opaque background
    pub fn raw_page_bitmap(&self, page: usize, dpi: f32) -> SessionResult<RgbaImage> {
        self.with_page(page, |doc| {
            let render_error = |e: mupdf::Error| SessionError::Render {
                page,
                reason: e.to_string(),
            };

            let loaded = doc.load_page(page as i32).map_err(render_error)?;
            let scale = dpi / 72.0;
            let matrix = Matrix::new_scale(scale, scale);
            let colorspace = Colorspace::device_rgb();
            let pixmap = loaded
                .to_pixmap(&matrix, &colorspace, false, true)
                .map_err(render_error)?;

            pixmap_to_rgba(&pixmap).ok_or_else(|| SessionError::Render {
                page,
                reason: "pixmap has an unexpected sample layout".to_string(),
            })
        })
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reject anything that does not start with `%PDF`
pub(crate) fn check_pdf_magic(path: &Path) -> Result<(), String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut magic = [0u8; 5];
    file.read_exact(&mut magic)
        .map_err(|_| "file is too short to be a PDF".to_string())?;
    if &magic != b"%PDF-" {
        return Err("not a PDF document".to_string());
    }
    Ok(())
}

/// Expand MuPDF samples (gray, RGB or RGBA) into an RGBA image
fn pixmap_to_rgba(pixmap: &mupdf::Pixmap) -> Option<RgbaImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;
    if n == 0 || samples.len() < (width as usize) * (height as usize) * n {
        return None;
    }

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for px in samples.chunks_exact(n).take((width * height) as usize) {
        let (r, g, b) = if n >= 3 {
            (px[0], px[1], px[2])
        } else {
            (px[0], px[0], px[0])
        };
        let a = if n == 4 || n == 2 { px[n - 1] } else { 255 };
        rgba.extend_from_slice(&[r, g, b, a]);
    }

    RgbaImage::from_raw(width, height, rgba)
}
