//! Document session errors

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// File missing, corrupt or not a PDF
    #[error("Failed to open document {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// Page index outside the document; callers clamp before calling
    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageIndex { page: usize, page_count: usize },

    /// A single page failed to rasterize or report its geometry
    #[error("Failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    /// No document is bound
    #[error("No document is open")]
    NotOpen,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
