//! Error types for the fill engine

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::export::ExportError;
use crate::preview::PreviewError;
use crate::project::{ProjectError, StoreError};
use crate::session::SessionError;

/// Engine-wide result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cannot open document {path:?}: {reason}")]
    DocumentOpen { path: PathBuf, reason: String },

    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageIndex { page: usize, page_count: usize },

    #[error("Failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error("Export failed: {0}")]
    ExportFatal(#[from] ExportError),

    #[error("Invalid field: {0}")]
    InvalidField(ProjectError),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Failed to persist project: {0}")]
    Store(#[from] StoreError),

    #[error("No document is open")]
    NoDocument,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, matchable classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DocumentOpen,
    PageIndex,
    Render,
    ExportFatal,
    InvalidField,
    FieldNotFound,
    Store,
    NoDocument,
    Io,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentOpen { .. } => ErrorKind::DocumentOpen,
            Self::PageIndex { .. } => ErrorKind::PageIndex,
            Self::Render { .. } => ErrorKind::Render,
            Self::ExportFatal(_) => ErrorKind::ExportFatal,
            Self::InvalidField(_) => ErrorKind::InvalidField,
            Self::FieldNotFound(_) => ErrorKind::FieldNotFound,
            Self::Store(_) => ErrorKind::Store,
            Self::NoDocument => ErrorKind::NoDocument,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Open { path, reason } => Self::DocumentOpen { path, reason },
            SessionError::PageIndex { page, page_count } => Self::PageIndex { page, page_count },
            SessionError::Render { page, reason } => Self::Render { page, reason },
            SessionError::NotOpen => Self::NoDocument,
        }
    }
}

impl From<ProjectError> for EngineError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::FieldNotFound(id) => Self::FieldNotFound(id),
            other => Self::InvalidField(other),
        }
    }
}

impl From<PreviewError> for EngineError {
    fn from(err: PreviewError) -> Self {
        match err {
            PreviewError::Session(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        Self::ExportFatal(err.into())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Task join error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_keep_their_kind() {
        let err: EngineError = SessionError::NotOpen.into();
        assert_eq!(err.kind(), ErrorKind::NoDocument);

        let err: EngineError = SessionError::PageIndex {
            page: 9,
            page_count: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::PageIndex);

        let err: EngineError = PreviewError::Session(SessionError::Render {
            page: 1,
            reason: "bad".to_string(),
        })
        .into();
        assert_eq!(err.kind(), ErrorKind::Render);
    }

    #[test]
    fn test_project_errors_split_by_kind() {
        let err: EngineError = ProjectError::FieldNotFound("f_x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::FieldNotFound);

        let err: EngineError = ProjectError::MissingTag.into();
        assert_eq!(err.kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ExportFatal).unwrap(),
            "\"export_fatal\""
        );
    }
}
