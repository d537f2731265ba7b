//! Preview pipeline errors

use thiserror::Error;

use crate::session::SessionError;
use crate::text::Script;

/// Failure of a whole preview request
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Document-level failure (no document, page out of range)
    #[error(transparent)]
    Session(#[from] SessionError),

    /// PNG encoding failed
    #[error("Image error: {0}")]
    ImageError(String),

    /// Disk tier could not be written
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Blocking render task panicked or was cancelled
    #[error("Render task failed: {0}")]
    TaskJoin(String),

    #[error("Render timed out after {0} seconds")]
    Timeout(u64),
}

/// Failure to draw one placement; absorbed into a warning
#[derive(Debug, Error)]
pub enum DrawError {
    #[error("No font available for {0:?} text")]
    NoFont(Script),
}

pub type PreviewResult<T> = std::result::Result<T, PreviewError>;
