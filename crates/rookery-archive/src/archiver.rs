//! The write path: turn an inbound message into an archived item.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jid::BareJid;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use rookery_core::{extract_tags, ArchiveError, ArchivedItem, Direction};

use crate::repository::MessageArchive;

/// Archives messages through a repository.
///
/// Persistence failures surface to the caller; the archiver never
/// retries and never blocks beyond the single store call.
pub struct Archiver<R: MessageArchive> {
    repo: Arc<R>,
    tag_support: bool,
}

impl<R: MessageArchive> Archiver<R> {
    pub fn new(repo: Arc<R>, tag_support: bool) -> Self {
        Self { repo, tag_support }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Archive one message and return its stable id.
    ///
    /// Direction is derived from the nominal author; the timestamp is
    /// archive-assigned when the protocol layer omitted one, and a
    /// fresh time-sortable stable id is generated when the caller did
    /// not supply an idempotency key.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, payload, stanza_id, stable_id), fields(owner = %owner, with = %with))]
    pub async fn archive_message(
        &self,
        owner: &BareJid,
        with: &BareJid,
        author: &BareJid,
        timestamp: Option<DateTime<Utc>>,
        payload: Value,
        stanza_id: Option<String>,
        stable_id: Option<String>,
    ) -> Result<String, ArchiveError> {
        let direction = Direction::from_author(owner, author);
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let stable_id = stable_id.unwrap_or_else(|| Uuid::now_v7().to_string());

        let tags = if self.tag_support {
            payload
                .get("body")
                .and_then(Value::as_str)
                .map(extract_tags)
                .unwrap_or_default()
        } else {
            BTreeSet::new()
        };

        let item = ArchivedItem {
            owner: owner.clone(),
            with: with.clone(),
            direction,
            timestamp,
            stable_id: stable_id.clone(),
            stanza_id,
            payload,
            tags,
        };

        self.repo.archive_item(&item).await?;
        debug!(stable_id = %stable_id, "message archived");

        Ok(stable_id)
    }
}
