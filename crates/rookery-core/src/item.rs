//! The archived item record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use jid::BareJid;
use serde_json::Value;

use crate::Direction;

/// One stored message.
///
/// Items are immutable once archived: they are removed by a range
/// delete or an expiry sweep, never updated in place. The triple
/// `(owner, with, stable_id)` is the idempotency key; archiving the
/// same triple again never produces a second retrievable copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedItem {
    /// Tenant account whose archive this item belongs to.
    pub owner: BareJid,
    /// The other party: conversation partner for one-to-one messages,
    /// room address for group messages.
    pub with: BareJid,
    pub direction: Direction,
    /// Archive-assigned when the protocol layer did not supply one.
    pub timestamp: DateTime<Utc>,
    /// Idempotency key, unique per `(owner, with)`.
    pub stable_id: String,
    /// Protocol-level identifier of the original message, kept for
    /// reverse lookup. Not required to be unique.
    pub stanza_id: Option<String>,
    /// Message content, stored verbatim for replay.
    pub payload: Value,
    pub tags: BTreeSet<String>,
}

impl ArchivedItem {
    /// Textual body of the payload, when present. Drives the
    /// `contains` filter and tag extraction.
    pub fn body(&self) -> Option<&str> {
        self.payload.get("body").and_then(Value::as_str)
    }
}
