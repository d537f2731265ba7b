//! Vector export of the filled document

pub mod error;
pub mod merger;
pub mod overlay;
pub mod pdf;

pub use error::{ExportError, ExportResult, ExportWarning};
pub use merger::{ExportMerger, ExportReport};
