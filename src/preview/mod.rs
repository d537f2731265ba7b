//! Preview pipeline
//!
//! Raw page raster + text overlay ([`OverlayCompositor`]) behind a two-tier
//! cache ([`PageCache`]), with neighbouring pages warmed in the background
//! ([`Prefetcher`]).

pub mod cache;
pub mod compositor;
pub mod disk;
pub mod error;
pub mod fonts;
pub mod prefetch;
pub mod types;

pub use cache::{CacheStats, Invalidation, PageCache};
pub use compositor::{Composite, OverlayCompositor};
pub use disk::DiskTier;
pub use error::{DrawError, PreviewError, PreviewResult};
pub use fonts::FontBook;
pub use prefetch::Prefetcher;
pub use types::{
    BitmapRef, PageRaster, PageSource, PreviewArtifact, RenderWarning, RenderedPage,
};
