//! Domain-to-store routing.
//!
//! The pool maps an owner's domain to its archive store, creating
//! stores lazily and caching them for the process lifetime. It
//! implements [`MessageArchive`] itself by delegating after
//! resolution, so callers never see the routing.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jid::BareJid;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use rookery_core::{ArchiveError, ArchivedItem, QueryCriteria, QueryPage, Settings};

use crate::legacy::Collection;
use crate::repository::MessageArchive;
use crate::store::LibSqlMessageArchive;

/// Reserved domain key that always resolves, even with zero tenants
/// configured. Used by operations that need a store but carry no owner
/// context yet.
pub const DEFAULT_DOMAIN: &str = "default";

/// Constructs the archive store for a domain on first access.
#[async_trait]
pub trait StoreFactory: Send + Sync + 'static {
    type Store: MessageArchive + 'static;

    async fn open(&self, domain: &str) -> Result<Arc<Self::Store>, ArchiveError>;
}

/// Factory for libSQL stores: one database file per domain under the
/// data directory, or in-memory stores when no directory is configured.
pub struct LibSqlStoreFactory {
    data_dir: Option<PathBuf>,
}

impl LibSqlStoreFactory {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self { data_dir }
    }

    pub fn in_memory() -> Self {
        Self { data_dir: None }
    }
}

#[async_trait]
impl StoreFactory for LibSqlStoreFactory {
    type Store = LibSqlMessageArchive;

    async fn open(&self, domain: &str) -> Result<Arc<Self::Store>, ArchiveError> {
        if domain.is_empty()
            || domain.contains('/')
            || domain.contains('\\')
            || domain.contains("..")
        {
            return Err(ArchiveError::Configuration(format!(
                "invalid domain key '{domain}'"
            )));
        }

        let store = match &self.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    ArchiveError::Configuration(format!(
                        "create data directory {}: {e}",
                        dir.display()
                    ))
                })?;
                let path = dir.join(format!("{domain}.db"));
                LibSqlMessageArchive::open_local(domain, &path).await?
            }
            None => LibSqlMessageArchive::in_memory(domain).await?,
        };

        Ok(Arc::new(store))
    }
}

/// Lazily populated registry of per-domain stores.
///
/// First resolution for a domain constructs the store exactly once,
/// even under concurrent resolution (per-domain single flight); a
/// failed construction is not cached, so a later resolve retries. No
/// lock spans domains.
pub struct RepositoryPool<F: StoreFactory> {
    factory: F,
    stores: DashMap<String, Arc<OnceCell<Arc<F::Store>>>>,
}

impl<F: StoreFactory> RepositoryPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            stores: DashMap::new(),
        }
    }

    /// Resolve the store serving `domain`, constructing it on first
    /// access.
    #[instrument(skip(self))]
    pub async fn repository(&self, domain: &str) -> Result<Arc<F::Store>, ArchiveError> {
        let cell = {
            let entry = self.stores.entry(domain.to_string()).or_default();
            Arc::clone(entry.value())
        };

        let store = cell
            .get_or_try_init(|| async {
                debug!(domain, "constructing archive store");
                self.factory.open(domain).await
            })
            .await?;

        Ok(Arc::clone(store))
    }

    /// The store behind the reserved [`DEFAULT_DOMAIN`] key.
    pub async fn default_store(&self) -> Result<Arc<F::Store>, ArchiveError> {
        self.repository(DEFAULT_DOMAIN).await
    }

    /// Number of domains with a resolution entry.
    pub fn resolved_domains(&self) -> usize {
        self.stores.len()
    }

    async fn for_owner(&self, owner: &BareJid) -> Result<Arc<F::Store>, ArchiveError> {
        self.repository(owner.domain().as_str()).await
    }
}

#[async_trait]
impl<F: StoreFactory> MessageArchive for RepositoryPool<F> {
    async fn archive_item(&self, item: &ArchivedItem) -> Result<(), ArchiveError> {
        self.for_owner(&item.owner).await?.archive_item(item).await
    }

    async fn query_items(&self, criteria: &QueryCriteria) -> Result<QueryPage, ArchiveError> {
        self.for_owner(criteria.owner())
            .await?
            .query_items(criteria)
            .await
    }

    async fn count_items(&self, criteria: &QueryCriteria) -> Result<u64, ArchiveError> {
        self.for_owner(criteria.owner())
            .await?
            .count_items(criteria)
            .await
    }

    async fn list_tags(
        &self,
        owner: &BareJid,
        prefix: &str,
        criteria: &QueryCriteria,
    ) -> Result<Vec<String>, ArchiveError> {
        self.for_owner(owner)
            .await?
            .list_tags(owner, prefix, criteria)
            .await
    }

    async fn remove_items(
        &self,
        owner: &BareJid,
        with: Option<&BareJid>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, ArchiveError> {
        self.for_owner(owner)
            .await?
            .remove_items(owner, with, start, end)
            .await
    }

    async fn delete_expired(
        &self,
        owner: &BareJid,
        before: DateTime<Utc>,
    ) -> Result<u64, ArchiveError> {
        self.for_owner(owner)
            .await?
            .delete_expired(owner, before)
            .await
    }

    async fn resolve_stable_id(
        &self,
        owner: &BareJid,
        with: &BareJid,
        stanza_id: &str,
    ) -> Result<Option<String>, ArchiveError> {
        self.for_owner(owner)
            .await?
            .resolve_stable_id(owner, with, stanza_id)
            .await
    }

    async fn get_item(
        &self,
        owner: &BareJid,
        stable_id: &str,
    ) -> Result<Option<ArchivedItem>, ArchiveError> {
        self.for_owner(owner)
            .await?
            .get_item(owner, stable_id)
            .await
    }

    async fn load_settings(&self, owner: &BareJid) -> Result<Option<Settings>, ArchiveError> {
        self.for_owner(owner).await?.load_settings(owner).await
    }

    async fn store_settings(
        &self,
        owner: &BareJid,
        settings: &Settings,
    ) -> Result<(), ArchiveError> {
        self.for_owner(owner)
            .await?
            .store_settings(owner, settings)
            .await
    }

    async fn query_collections(
        &self,
        criteria: &QueryCriteria,
    ) -> Result<Vec<Collection>, ArchiveError> {
        self.for_owner(criteria.owner())
            .await?
            .query_collections(criteria)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts constructions so tests can assert single-flight behavior.
    struct CountingFactory {
        constructed: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                constructed: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            }
        }

        fn failing_once() -> Self {
            Self {
                constructed: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(1),
            }
        }
    }

    #[async_trait]
    impl StoreFactory for CountingFactory {
        type Store = LibSqlMessageArchive;

        async fn open(&self, domain: &str) -> Result<Arc<Self::Store>, ArchiveError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(ArchiveError::Configuration("transient".into()));
            }
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LibSqlMessageArchive::in_memory(domain).await?))
        }
    }

    #[tokio::test]
    async fn concurrent_resolution_constructs_once() {
        let pool = Arc::new(RepositoryPool::new(CountingFactory::new()));

        let resolutions = futures::future::join_all(
            (0..8).map(|_| {
                let pool = Arc::clone(&pool);
                async move { pool.repository("example.com").await }
            }),
        )
        .await;

        let stores: Vec<_> = resolutions
            .into_iter()
            .map(|r| r.expect("resolution succeeds"))
            .collect();
        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }
        assert_eq!(pool.factory.constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_domains_get_distinct_stores() {
        let pool = RepositoryPool::new(CountingFactory::new());

        let a = pool.repository("a.example").await.unwrap();
        let b = pool.repository("b.example").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.resolved_domains(), 2);
    }

    #[tokio::test]
    async fn failed_construction_is_retried() {
        let pool = RepositoryPool::new(CountingFactory::failing_once());

        assert!(matches!(
            pool.repository("example.com").await,
            Err(ArchiveError::Configuration(_))
        ));
        // The failure was not cached; the next resolve constructs.
        let store = pool.repository("example.com").await.unwrap();
        assert_eq!(store.domain(), "example.com");
        assert_eq!(pool.factory.constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_domain_always_resolves() {
        let pool = RepositoryPool::new(LibSqlStoreFactory::in_memory());
        let store = pool.default_store().await.unwrap();
        assert_eq!(store.domain(), DEFAULT_DOMAIN);
    }

    #[tokio::test]
    async fn file_backed_factory_creates_one_database_per_domain() {
        use std::collections::BTreeSet;

        let dir = tempfile::TempDir::new().unwrap();
        let data_dir = dir.path().join("archives");
        let pool = RepositoryPool::new(LibSqlStoreFactory::new(Some(data_dir.clone())));

        let item = ArchivedItem {
            owner: BareJid::new("alice@example.com").unwrap(),
            with: BareJid::new("bob@example.com").unwrap(),
            direction: rookery_core::Direction::Incoming,
            timestamp: Utc::now(),
            stable_id: "id-1".into(),
            stanza_id: None,
            payload: serde_json::json!({"body": "persisted"}),
            tags: BTreeSet::new(),
        };
        pool.archive_item(&item).await.unwrap();

        assert!(data_dir.join("example.com.db").exists());
    }

    #[tokio::test]
    async fn factory_rejects_unusable_domain_keys() {
        let factory = LibSqlStoreFactory::in_memory();
        for bad in ["", "../etc", "a/b", "a\\b"] {
            assert!(matches!(
                factory.open(bad).await,
                Err(ArchiveError::Configuration(_))
            ));
        }
    }
}
