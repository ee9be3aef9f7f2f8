//! Superseded collection-based compatibility layer.
//!
//! The flat collection API predates cursor-based retrieval and is kept
//! only so old callers keep working. It is a thin adapter over the
//! current item model: collection listing translates into a criteria
//! query on the store, and bulk uploads flow through the regular write
//! path. No storage logic lives here.

use chrono::{DateTime, Duration, Utc};
use jid::BareJid;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use rookery_core::{ArchiveError, Direction};

use crate::archiver::Archiver;
use crate::repository::MessageArchive;

/// One legacy conversation collection: the items exchanged with a peer
/// during one UTC day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub with: BareJid,
    /// Start of the day bucket.
    pub start: DateTime<Utc>,
}

/// One entry of a legacy bulk upload.
///
/// Entries whose direction did not parse are carried as `None` and
/// skipped on save, matching the old API's tolerance.
#[derive(Debug, Clone)]
pub struct LegacyItem {
    pub direction: Option<Direction>,
    /// Offset in seconds from the collection start.
    pub secs: Option<i64>,
    /// Explicit timestamp; consulted when no offset is given.
    pub utc: Option<DateTime<Utc>>,
    pub payload: Value,
}

impl LegacyItem {
    /// Timestamp resolution of the old API: start + secs wins, then the
    /// explicit stamp, then the collection start itself.
    fn resolve_timestamp(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(secs) = self.secs {
            start + Duration::seconds(secs)
        } else if let Some(utc) = self.utc {
            utc
        } else {
            start
        }
    }
}

/// Store a legacy collection upload through the current write path.
/// Returns the number of items saved.
#[instrument(skip(archiver, items), fields(owner = %owner, with = %with))]
pub async fn save_items<R: MessageArchive>(
    archiver: &Archiver<R>,
    owner: &BareJid,
    with: &BareJid,
    start: DateTime<Utc>,
    items: Vec<LegacyItem>,
) -> Result<u64, ArchiveError> {
    let mut saved = 0;

    for entry in items {
        let Some(direction) = entry.direction else {
            continue;
        };

        let timestamp = entry.resolve_timestamp(start);
        let author = match direction {
            Direction::Outgoing => owner.clone(),
            Direction::Incoming => with.clone(),
        };

        archiver
            .archive_message(
                owner,
                with,
                &author,
                Some(timestamp),
                entry.payload,
                None,
                Some(Uuid::new_v4().to_string()),
            )
            .await?;
        saved += 1;
    }

    Ok(saved)
}
