//! Retention sweeps.
//!
//! Stateless: the controller applies a cutoff it is handed. Cadence and
//! cutoff computation belong to the scheduler driving it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jid::BareJid;
use tracing::{debug, instrument};

use rookery_core::ArchiveError;

use crate::repository::MessageArchive;

/// Cutoff instant for a configured retention period.
pub fn cutoff(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    now - period
}

pub struct RetentionController<R: MessageArchive> {
    repo: Arc<R>,
}

impl<R: MessageArchive> RetentionController<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Remove every item for the owner older than the cutoff. Returns
    /// the number of removed items.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn purge_expired(
        &self,
        owner: &BareJid,
        before: DateTime<Utc>,
    ) -> Result<u64, ArchiveError> {
        let removed = self.repo.delete_expired(owner, before).await?;
        if removed > 0 {
            debug!(removed, "retention sweep removed expired items");
        }
        Ok(removed)
    }
}
