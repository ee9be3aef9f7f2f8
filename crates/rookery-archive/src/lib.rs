//! Rookery archive engine.
//!
//! The storage and query engine behind the archive: durable
//! at-most-once writes keyed by `(owner, with, stable_id)`, filtered
//! and cursor-paginated retrieval, per-domain repository routing, and
//! the per-owner preference state reconciled against server policy.
//!
//! Layout:
//! - [`repository`]: the [`MessageArchive`] contract
//! - [`store`]: libSQL-backed implementation
//! - [`pool`]: domain → store routing with lazy single-flight creation
//! - [`prefs`]: preference engine and server policy
//! - [`archiver`]: the write path
//! - [`retention`]: expiry sweeps
//! - [`legacy`]: superseded collection-based compatibility layer
//! - [`config`]: engine configuration

pub mod archiver;
pub mod config;
pub mod legacy;
pub mod pool;
pub mod prefs;
pub mod repository;
pub mod retention;
pub mod store;

pub use archiver::Archiver;
pub use config::{ArchiveConfig, PolicyConfig};
pub use legacy::{Collection, LegacyItem};
pub use pool::{LibSqlStoreFactory, RepositoryPool, StoreFactory, DEFAULT_DOMAIN};
pub use prefs::{PreferenceEngine, ServerPolicy};
pub use repository::MessageArchive;
pub use retention::{cutoff as retention_cutoff, RetentionController};
pub use store::LibSqlMessageArchive;
