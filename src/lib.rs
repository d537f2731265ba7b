//! Input Studio engine
//!
//! Field-fill engine for fixed PDF templates: positioned text placements are
//! bound to tagged values, previewed as rasters through a two-tier page
//! cache, and exported as a vector overlay on a copy of the template.
//!
//! # Modules
//!
//! - `engine`: The [`FillEngine`] façade every caller goes through
//! - `session`: The single live MuPDF handle for the bound document
//! - `project`: Tags, values, placements and their persistence
//! - `preview`: Raster compositing, the memory/disk page cache and prefetch
//! - `export`: Vector overlay export and document merge via lopdf

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod geometry;
pub mod preview;
pub mod project;
pub mod session;
pub mod text;

#[cfg(test)]
mod testutil;

pub use engine::{FieldInfo, FillEngine};
pub use error::{EngineError, ErrorKind, Result};
