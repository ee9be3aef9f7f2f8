//! Query criteria, cursors and result pages.
//!
//! A [`QueryCriteria`] is an immutable description of one retrieval:
//! filters, page size, page direction and an optional position marker.
//! The engine never mutates caller-supplied criteria; re-issuing the
//! same criteria over an unchanged archive yields the same page.

use std::collections::BTreeSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jid::BareJid;

use crate::{ArchiveError, ArchivedItem};

/// Page size applied when the caller does not request one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Upper bound on a single page, whatever the caller asks for.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Opaque pagination marker referencing one archived row's
/// `(timestamp, sequence)` position.
///
/// Wall-clock timestamps are not unique, so the marker carries the
/// store-assigned sequence number as a tiebreaker. Callers only ever
/// see the encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    timestamp_millis: i64,
    sequence: i64,
}

impl Cursor {
    pub fn new(timestamp: DateTime<Utc>, sequence: i64) -> Self {
        Self {
            timestamp_millis: timestamp.timestamp_millis(),
            sequence,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_millis)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Encode for handing to protocol callers.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.timestamp_millis, self.sequence))
    }

    /// Decode a caller-supplied marker. Anything that does not parse is
    /// an invalid request, not a miss.
    pub fn decode(encoded: &str) -> Result<Self, ArchiveError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| ArchiveError::InvalidRequest("unparsable cursor".into()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ArchiveError::InvalidRequest("unparsable cursor".into()))?;
        let (millis, seq) = text
            .split_once(':')
            .ok_or_else(|| ArchiveError::InvalidRequest("unparsable cursor".into()))?;
        let timestamp_millis = millis
            .parse::<i64>()
            .map_err(|_| ArchiveError::InvalidRequest("unparsable cursor".into()))?;
        let sequence = seq
            .parse::<i64>()
            .map_err(|_| ArchiveError::InvalidRequest("unparsable cursor".into()))?;
        Ok(Self {
            timestamp_millis,
            sequence,
        })
    }
}

/// Which side of the cursor a page is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageDirection {
    /// Items strictly after the cursor, oldest first.
    #[default]
    Forward,
    /// Items strictly before the cursor. Without a cursor this is the
    /// "most recent N" page; results are still returned oldest first.
    Backward,
}

/// Immutable description of one archive retrieval.
#[derive(Debug, Clone)]
pub struct QueryCriteria {
    owner: BareJid,
    with: Option<BareJid>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    tags: BTreeSet<String>,
    contains: Option<String>,
    cursor: Option<Cursor>,
    page_direction: PageDirection,
    limit: u32,
}

impl QueryCriteria {
    pub fn builder(owner: BareJid) -> QueryCriteriaBuilder {
        QueryCriteriaBuilder {
            inner: QueryCriteria {
                owner,
                with: None,
                start: None,
                end: None,
                tags: BTreeSet::new(),
                contains: None,
                cursor: None,
                page_direction: PageDirection::Forward,
                limit: DEFAULT_PAGE_SIZE,
            },
        }
    }

    pub fn owner(&self) -> &BareJid {
        &self.owner
    }

    pub fn with(&self) -> Option<&BareJid> {
        self.with.as_ref()
    }

    /// Inclusive lower bound of the time window.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Exclusive upper bound of the time window.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Conjunctive tag filter: an item matches only if it carries every
    /// listed tag.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn contains(&self) -> Option<&str> {
        self.contains.as_deref()
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn page_direction(&self) -> PageDirection {
        self.page_direction
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Consuming builder for [`QueryCriteria`].
#[derive(Debug)]
pub struct QueryCriteriaBuilder {
    inner: QueryCriteria,
}

impl QueryCriteriaBuilder {
    pub fn with(mut self, peer: BareJid) -> Self {
        self.inner.with = Some(peer);
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.inner.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.inner.end = Some(end);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.inner.tags.insert(tag.into());
        self
    }

    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.inner.contains = Some(needle.into());
        self
    }

    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.inner.cursor = Some(cursor);
        self
    }

    pub fn page_direction(mut self, direction: PageDirection) -> Self {
        self.inner.page_direction = direction;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.inner.limit = limit.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn build(self) -> QueryCriteria {
        self.inner
    }
}

/// One page of query results plus the metadata needed to continue
/// paginating in either direction.
#[derive(Debug, Clone)]
pub struct QueryPage {
    /// Matching items in chronological `(timestamp, sequence)` order.
    pub items: Vec<ArchivedItem>,
    /// True when no further results exist in the requested direction.
    pub complete: bool,
    /// Position of the first item on this page.
    pub first: Option<Cursor>,
    /// Position of the last item on this page.
    pub last: Option<Cursor>,
}

impl QueryPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            complete: true,
            first: None,
            last: None,
        }
    }
}
