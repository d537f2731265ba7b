//! Export errors and warnings

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::project::FieldId;

/// Failures that abort an export; nothing is left at the output path
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Cannot read source document {path:?}: {reason}")]
    Source { path: PathBuf, reason: String },

    #[error("Cannot write export to {path:?}: {reason}")]
    Destination { path: PathBuf, reason: String },

    #[error("Malformed PDF structure: {0}")]
    Structure(String),
}

impl From<lopdf::Error> for ExportError {
    fn from(err: lopdf::Error) -> Self {
        ExportError::Structure(err.to_string())
    }
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// A placement or page that was exported in degraded form
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportWarning {
    PlacementSkipped {
        field: FieldId,
        page: usize,
        reason: String,
    },
    ColorFallback {
        field: FieldId,
        color: String,
    },
    /// Characters outside the font encoding were replaced with `?`
    TextReplaced {
        field: FieldId,
        replaced: usize,
    },
    /// The overlay could not be attached; the page was kept unchanged
    PageUnchanged {
        page: usize,
        reason: String,
    },
}
