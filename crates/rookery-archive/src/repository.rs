//! The archive store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jid::BareJid;

use rookery_core::{ArchiveError, ArchivedItem, QueryCriteria, QueryPage, Settings};

use crate::legacy::Collection;

/// Persistence contract for one archive store.
///
/// Implemented by the libSQL store for a single backing database and by
/// [`crate::RepositoryPool`], which routes every call to the store for
/// the owner's domain so callers are agnostic to pooling.
///
/// Every operation is safe to call concurrently, for the same owner and
/// across owners. Operations return when the backing I/O completes;
/// deadlines belong to the caller (wrap calls in `tokio::time::timeout`
/// to abort the awaited I/O).
#[async_trait]
pub trait MessageArchive: Send + Sync {
    /// Durably persist one item.
    ///
    /// Idempotent on `(owner, with, stable_id)`: repeated or concurrent
    /// calls with the same key keep exactly one retrievable copy, and a
    /// duplicate-key race is absorbed as success. Once stored the item
    /// is visible to queries, ordered by `(timestamp, sequence)` where
    /// the sequence number is assigned at insert.
    async fn archive_item(&self, item: &ArchivedItem) -> Result<(), ArchiveError>;

    /// One page of matching items, chronologically ascending, plus
    /// pagination metadata. Re-issuing the same criteria over an
    /// unchanged archive returns the same page.
    async fn query_items(&self, criteria: &QueryCriteria) -> Result<QueryPage, ArchiveError>;

    /// Total number of items matching the criteria's filters. The
    /// criteria's cursor and page size are ignored.
    async fn count_items(&self, criteria: &QueryCriteria) -> Result<u64, ArchiveError>;

    /// Ordered distinct tags starting with `prefix`, scoped by the
    /// criteria's filters.
    async fn list_tags(
        &self,
        owner: &BareJid,
        prefix: &str,
        criteria: &QueryCriteria,
    ) -> Result<Vec<String>, ArchiveError>;

    /// Delete items matching the given dimensions; an omitted filter
    /// leaves that dimension unconstrained. Returns the number of
    /// deleted items.
    async fn remove_items(
        &self,
        owner: &BareJid,
        with: Option<&BareJid>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, ArchiveError>;

    /// Delete every item for the owner with a timestamp strictly before
    /// the cutoff. Returns the number of deleted items.
    async fn delete_expired(
        &self,
        owner: &BareJid,
        before: DateTime<Utc>,
    ) -> Result<u64, ArchiveError>;

    /// Reverse lookup from a protocol-level stanza id to the archive's
    /// stable id. A miss is a normal outcome, returned as `None`.
    async fn resolve_stable_id(
        &self,
        owner: &BareJid,
        with: &BareJid,
        stanza_id: &str,
    ) -> Result<Option<String>, ArchiveError>;

    /// Fetch a single item by its stable id.
    async fn get_item(
        &self,
        owner: &BareJid,
        stable_id: &str,
    ) -> Result<Option<ArchivedItem>, ArchiveError>;

    /// Last persisted preference blob for the owner, if any.
    async fn load_settings(&self, owner: &BareJid) -> Result<Option<Settings>, ArchiveError>;

    /// Persist the owner's preferences. Last writer wins; there is no
    /// version token.
    async fn store_settings(
        &self,
        owner: &BareJid,
        settings: &Settings,
    ) -> Result<(), ArchiveError>;

    /// Legacy collection listing: distinct `(with, day)` groups
    /// matching the criteria, in chronological order.
    async fn query_collections(
        &self,
        criteria: &QueryCriteria,
    ) -> Result<Vec<Collection>, ArchiveError>;
}
