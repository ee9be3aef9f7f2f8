//! Rookery core domain model.
//!
//! Everything the archive engine agrees on without touching storage:
//! - [`ArchivedItem`]: one stored message and its idempotency key
//! - [`Direction`]: incoming/outgoing relative to the archive owner
//! - [`QueryCriteria`] and [`Cursor`]: immutable retrieval descriptions
//! - [`Settings`] and the preference presets
//! - [`ArchiveError`]: the engine-wide error taxonomy

pub mod criteria;
pub mod direction;
pub mod error;
pub mod item;
pub mod settings;
pub mod tags;

pub use criteria::{
    Cursor, PageDirection, QueryCriteria, QueryPage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use direction::Direction;
pub use error::ArchiveError;
pub use item::ArchivedItem;
pub use settings::{Preset, Settings, StoreMethod, StoreMucMessages};
pub use tags::extract_tags;
