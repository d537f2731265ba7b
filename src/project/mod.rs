//! Project state: tags, values and field placements
//!
//! Placements and values live in two separate maps so one value can feed
//! any number of positions (`field id → placement → tag → value`).

mod error;
mod patch;
mod state;
mod store;
mod types;

pub use error::{ProjectError, ProjectResult};
pub use patch::FieldPatch;
pub use state::{PageSet, ProjectState, Removal};
pub use store::{JsonProjectStore, ProjectStore, StoreError};
pub use types::{FieldId, Placement, Rgb, DEFAULT_COLOR, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT};
