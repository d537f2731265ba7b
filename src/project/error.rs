//! Project state errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    /// Tag missing or blank
    #[error("Missing tag")]
    MissingTag,

    /// Unknown field id
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Page outside the bound document
    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    /// Color string could not be parsed
    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    /// Style attribute out of range
    #[error("Invalid {attribute}: {reason}")]
    InvalidAttribute {
        attribute: &'static str,
        reason: String,
    },

    /// Position or size cannot be drawn
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

pub type ProjectResult<T> = std::result::Result<T, ProjectError>;
