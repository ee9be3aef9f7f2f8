//! libSQL-backed archive store.
//!
//! One store wraps one backing database and implements the full
//! [`MessageArchive`] contract:
//! - at-most-once writes keyed by `(owner, with, stable_id)`
//! - cursor pagination over `(timestamp, sequence)`
//! - conjunctive peer/time/tag/contains filtering
//! - the per-owner settings blob

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use jid::BareJid;
use libsql::{Builder, Connection, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use rookery_core::{
    ArchiveError, ArchivedItem, Cursor, Direction, PageDirection, QueryCriteria, QueryPage,
    Settings,
};

use crate::legacy::Collection;
use crate::repository::MessageArchive;

/// Schema for one archive database. Applied idempotently on first use.
const ARCHIVE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS archive_items (
    -- Monotonic insert order; tiebreaker for identical timestamps
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    -- Tenant account the item belongs to
    owner TEXT NOT NULL,
    -- Conversation partner or room address
    with_jid TEXT NOT NULL,
    -- Idempotency key, unique per (owner, with_jid)
    stable_id TEXT NOT NULL,
    -- Protocol-level id of the original message, for reverse lookup
    stanza_id TEXT,
    -- 0 = outgoing, 1 = incoming
    direction INTEGER NOT NULL,
    -- RFC 3339 UTC, millisecond precision (fixed width, sorts correctly)
    timestamp TEXT NOT NULL,
    -- Extracted body text, drives the contains filter
    body TEXT,
    -- Full message content, stored verbatim as JSON
    payload TEXT NOT NULL,
    UNIQUE (owner, with_jid, stable_id)
);

CREATE INDEX IF NOT EXISTS idx_archive_owner_time
    ON archive_items(owner, timestamp, seq);

CREATE INDEX IF NOT EXISTS idx_archive_owner_peer_time
    ON archive_items(owner, with_jid, timestamp);

CREATE INDEX IF NOT EXISTS idx_archive_owner_stanza
    ON archive_items(owner, stanza_id);

CREATE TABLE IF NOT EXISTS archive_item_tags (
    item_seq INTEGER NOT NULL,
    tag TEXT NOT NULL,
    UNIQUE (item_seq, tag)
);

CREATE INDEX IF NOT EXISTS idx_archive_tags_tag
    ON archive_item_tags(tag, item_seq);

CREATE TABLE IF NOT EXISTS archive_settings (
    owner TEXT PRIMARY KEY,
    -- Opaque serialized preference blob
    settings TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

fn db_err(error: libsql::Error) -> ArchiveError {
    ArchiveError::StorageUnavailable(error.to_string())
}

/// Fixed-width RFC 3339 at millisecond precision, so the stored text
/// sorts chronologically and round-trips through cursors exactly.
fn fmt_ts(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>, ArchiveError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArchiveError::StorageUnavailable(format!("corrupt timestamp '{text}': {e}")))
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::from(text.to_string()),
        None => Value::Null,
    }
}

/// Append the criteria's filter dimensions (peer, time window, contains
/// hint, tag set) to a WHERE clause over `archive_items i`. The owner
/// constraint is the caller's first predicate; cursor and limit are
/// handled separately.
fn push_filters(criteria: &QueryCriteria, sql: &mut String, params: &mut Vec<Value>) {
    if let Some(with) = criteria.with() {
        sql.push_str(" AND i.with_jid = ?");
        params.push(Value::from(with.to_string()));
    }
    if let Some(start) = criteria.start() {
        sql.push_str(" AND i.timestamp >= ?");
        params.push(Value::from(fmt_ts(&start)));
    }
    if let Some(end) = criteria.end() {
        sql.push_str(" AND i.timestamp < ?");
        params.push(Value::from(fmt_ts(&end)));
    }
    if let Some(needle) = criteria.contains() {
        sql.push_str(" AND i.body LIKE ?");
        params.push(Value::from(format!("%{needle}%")));
    }
    for tag in criteria.tags() {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM archive_item_tags t \
             WHERE t.item_seq = i.seq AND t.tag = ?)",
        );
        params.push(Value::from(tag.clone()));
    }
}

/// Archive store bound to one libSQL database.
///
/// Single-connection mode behind a mutex; safe for concurrent callers.
/// The schema is created on first use.
pub struct LibSqlMessageArchive {
    domain: String,
    conn: Arc<Mutex<Connection>>,
    initialized: AtomicBool,
}

impl LibSqlMessageArchive {
    /// Wrap an existing connection (for sharing with other components).
    pub fn from_connection(domain: impl Into<String>, conn: Connection) -> Self {
        Self {
            domain: domain.into(),
            conn: Arc::new(Mutex::new(conn)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Open (or create) a file-backed store.
    pub async fn open_local(domain: impl Into<String>, path: &Path) -> Result<Self, ArchiveError> {
        let domain = domain.into();
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ArchiveError::Configuration(format!("open {}: {e}", path.display())))?;
        let conn = db
            .connect()
            .map_err(|e| ArchiveError::Configuration(format!("connect {}: {e}", path.display())))?;
        info!(domain = %domain, path = %path.display(), "archive store opened");
        Ok(Self::from_connection(domain, conn))
    }

    /// Open an in-memory store (tests, zero-config deployments).
    pub async fn in_memory(domain: impl Into<String>) -> Result<Self, ArchiveError> {
        let domain = domain.into();
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| ArchiveError::Configuration(format!("open in-memory store: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| ArchiveError::Configuration(format!("connect in-memory store: {e}")))?;
        Ok(Self::from_connection(domain, conn))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    async fn initialize(&self) -> Result<(), ArchiveError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        conn.execute_batch(ARCHIVE_SCHEMA).await.map_err(db_err)?;
        self.initialized.store(true, Ordering::Release);
        debug!(domain = %self.domain, "archive schema initialized");

        Ok(())
    }

    /// Reject a cursor that references no archived row for this owner.
    async fn check_cursor_position(
        &self,
        conn: &Connection,
        criteria: &QueryCriteria,
    ) -> Result<(), ArchiveError> {
        let Some(cursor) = criteria.cursor() else {
            return Ok(());
        };

        let mut rows = conn
            .query(
                "SELECT 1 FROM archive_items \
                 WHERE owner = ? AND timestamp = ? AND seq = ?",
                vec![
                    Value::from(criteria.owner().to_string()),
                    Value::from(fmt_ts(&cursor.timestamp())),
                    Value::from(cursor.sequence()),
                ],
            )
            .await
            .map_err(db_err)?;

        if rows.next().await.map_err(db_err)?.is_none() {
            return Err(ArchiveError::NotFound(
                "cursor references no archived item".into(),
            ));
        }

        Ok(())
    }

    /// Tags for a page of items, one query for the whole page.
    async fn tags_for(
        &self,
        conn: &Connection,
        seqs: &[i64],
    ) -> Result<HashMap<i64, BTreeSet<String>>, ArchiveError> {
        let mut tags: HashMap<i64, BTreeSet<String>> = HashMap::new();
        if seqs.is_empty() {
            return Ok(tags);
        }

        let placeholders = vec!["?"; seqs.len()].join(", ");
        let sql = format!(
            "SELECT item_seq, tag FROM archive_item_tags WHERE item_seq IN ({placeholders})"
        );
        let params: Vec<Value> = seqs.iter().map(|seq| Value::from(*seq)).collect();

        let mut rows = conn.query(&sql, params).await.map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let seq: i64 = row.get(0).map_err(db_err)?;
            let tag: String = row.get(1).map_err(db_err)?;
            tags.entry(seq).or_default().insert(tag);
        }

        Ok(tags)
    }

    fn item_from_row(
        owner: &BareJid,
        row: &libsql::Row,
    ) -> Result<(i64, ArchivedItem), ArchiveError> {
        let seq: i64 = row.get(0).map_err(db_err)?;
        let with_text: String = row.get(1).map_err(db_err)?;
        let stable_id: String = row.get(2).map_err(db_err)?;
        let stanza_id: Option<String> = row.get::<Option<String>>(3).ok().flatten();
        let direction_code: i64 = row.get(4).map_err(db_err)?;
        let timestamp_text: String = row.get(5).map_err(db_err)?;
        let payload_text: String = row.get(6).map_err(db_err)?;

        let with = BareJid::new(&with_text).map_err(|e| {
            ArchiveError::StorageUnavailable(format!("corrupt peer address '{with_text}': {e}"))
        })?;
        let direction = Direction::from_value(direction_code).ok_or_else(|| {
            ArchiveError::StorageUnavailable(format!("corrupt direction code {direction_code}"))
        })?;
        let timestamp = parse_ts(&timestamp_text)?;
        let payload = serde_json::from_str(&payload_text)
            .map_err(|e| ArchiveError::StorageUnavailable(format!("corrupt payload: {e}")))?;

        Ok((
            seq,
            ArchivedItem {
                owner: owner.clone(),
                with,
                direction,
                timestamp,
                stable_id,
                stanza_id,
                payload,
                tags: BTreeSet::new(),
            },
        ))
    }
}

#[async_trait]
impl MessageArchive for LibSqlMessageArchive {
    #[instrument(skip(self, item), fields(owner = %item.owner, with = %item.with))]
    async fn archive_item(&self, item: &ArchivedItem) -> Result<(), ArchiveError> {
        self.initialize().await?;

        let payload = serde_json::to_string(&item.payload)
            .map_err(|e| ArchiveError::StorageUnavailable(format!("payload encode: {e}")))?;

        let conn = self.conn.lock().await;

        // INSERT OR IGNORE absorbs the duplicate-key race: the first
        // write wins and a repeat is success, never a conflict.
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO archive_items \
                 (owner, with_jid, stable_id, stanza_id, direction, timestamp, body, payload) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                vec![
                    Value::from(item.owner.to_string()),
                    Value::from(item.with.to_string()),
                    Value::from(item.stable_id.clone()),
                    opt_text(item.stanza_id.as_deref()),
                    Value::from(item.direction.value()),
                    Value::from(fmt_ts(&item.timestamp)),
                    opt_text(item.body()),
                    Value::from(payload),
                ],
            )
            .await
            .map_err(db_err)?;

        if inserted == 0 {
            debug!(stable_id = %item.stable_id, "duplicate stable id, write absorbed");
            return Ok(());
        }

        let seq = conn.last_insert_rowid();
        for tag in &item.tags {
            conn.execute(
                "INSERT OR IGNORE INTO archive_item_tags (item_seq, tag) VALUES (?, ?)",
                vec![Value::from(seq), Value::from(tag.clone())],
            )
            .await
            .map_err(db_err)?;
        }

        debug!(stable_id = %item.stable_id, seq, "item archived");
        Ok(())
    }

    #[instrument(skip(self, criteria), fields(owner = %criteria.owner()))]
    async fn query_items(&self, criteria: &QueryCriteria) -> Result<QueryPage, ArchiveError> {
        self.initialize().await?;

        let conn = self.conn.lock().await;
        self.check_cursor_position(&conn, criteria).await?;

        let mut sql = String::from(
            "SELECT i.seq, i.with_jid, i.stable_id, i.stanza_id, i.direction, \
             i.timestamp, i.payload \
             FROM archive_items i WHERE i.owner = ?",
        );
        let mut params: Vec<Value> = vec![Value::from(criteria.owner().to_string())];
        push_filters(criteria, &mut sql, &mut params);

        if let Some(cursor) = criteria.cursor() {
            let ts = fmt_ts(&cursor.timestamp());
            match criteria.page_direction() {
                PageDirection::Forward => {
                    sql.push_str(
                        " AND (i.timestamp > ? OR (i.timestamp = ? AND i.seq > ?))",
                    );
                }
                PageDirection::Backward => {
                    sql.push_str(
                        " AND (i.timestamp < ? OR (i.timestamp = ? AND i.seq < ?))",
                    );
                }
            }
            params.push(Value::from(ts.clone()));
            params.push(Value::from(ts));
            params.push(Value::from(cursor.sequence()));
        }

        match criteria.page_direction() {
            PageDirection::Forward => sql.push_str(" ORDER BY i.timestamp ASC, i.seq ASC"),
            PageDirection::Backward => sql.push_str(" ORDER BY i.timestamp DESC, i.seq DESC"),
        }

        // One extra row tells us whether more results exist.
        let limit = criteria.limit() as usize;
        sql.push_str(&format!(" LIMIT {}", limit + 1));

        let mut rows = conn.query(&sql, params).await.map_err(db_err)?;
        let mut page: Vec<(i64, ArchivedItem)> = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            page.push(Self::item_from_row(criteria.owner(), &row)?);
        }

        let complete = page.len() <= limit;
        if page.len() > limit {
            page.pop();
        }
        if criteria.page_direction() == PageDirection::Backward {
            page.reverse();
        }

        let seqs: Vec<i64> = page.iter().map(|(seq, _)| *seq).collect();
        let mut tags = self.tags_for(&conn, &seqs).await?;

        let first = page
            .first()
            .map(|(seq, item)| Cursor::new(item.timestamp, *seq));
        let last = page
            .last()
            .map(|(seq, item)| Cursor::new(item.timestamp, *seq));

        let items = page
            .into_iter()
            .map(|(seq, mut item)| {
                if let Some(item_tags) = tags.remove(&seq) {
                    item.tags = item_tags;
                }
                item
            })
            .collect::<Vec<_>>();

        debug!(count = items.len(), complete, "archive query completed");

        Ok(QueryPage {
            items,
            complete,
            first,
            last,
        })
    }

    async fn count_items(&self, criteria: &QueryCriteria) -> Result<u64, ArchiveError> {
        self.initialize().await?;

        let mut sql =
            String::from("SELECT COUNT(*) FROM archive_items i WHERE i.owner = ?");
        let mut params: Vec<Value> = vec![Value::from(criteria.owner().to_string())];
        push_filters(criteria, &mut sql, &mut params);

        let conn = self.conn.lock().await;
        let mut rows = conn.query(&sql, params).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let count: i64 = row.get(0).map_err(db_err)?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }

    async fn list_tags(
        &self,
        owner: &BareJid,
        prefix: &str,
        criteria: &QueryCriteria,
    ) -> Result<Vec<String>, ArchiveError> {
        self.initialize().await?;

        let mut sql = String::from(
            "SELECT DISTINCT t.tag FROM archive_item_tags t \
             JOIN archive_items i ON i.seq = t.item_seq \
             WHERE i.owner = ?",
        );
        let mut params: Vec<Value> = vec![Value::from(owner.to_string())];
        push_filters(criteria, &mut sql, &mut params);
        sql.push_str(" AND t.tag LIKE ? ORDER BY t.tag ASC");
        params.push(Value::from(format!("{prefix}%")));

        let conn = self.conn.lock().await;
        let mut rows = conn.query(&sql, params).await.map_err(db_err)?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            tags.push(row.get::<String>(0).map_err(db_err)?);
        }

        Ok(tags)
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn remove_items(
        &self,
        owner: &BareJid,
        with: Option<&BareJid>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, ArchiveError> {
        self.initialize().await?;

        let mut clause = String::from("owner = ?");
        let mut params: Vec<Value> = vec![Value::from(owner.to_string())];
        if let Some(with) = with {
            clause.push_str(" AND with_jid = ?");
            params.push(Value::from(with.to_string()));
        }
        if let Some(start) = start {
            clause.push_str(" AND timestamp >= ?");
            params.push(Value::from(fmt_ts(&start)));
        }
        if let Some(end) = end {
            clause.push_str(" AND timestamp < ?");
            params.push(Value::from(fmt_ts(&end)));
        }

        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "DELETE FROM archive_item_tags WHERE item_seq IN \
                 (SELECT seq FROM archive_items WHERE {clause})"
            ),
            params.clone(),
        )
        .await
        .map_err(db_err)?;

        let removed = conn
            .execute(&format!("DELETE FROM archive_items WHERE {clause}"), params)
            .await
            .map_err(db_err)?;

        debug!(removed, "items removed");
        Ok(removed)
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn delete_expired(
        &self,
        owner: &BareJid,
        before: DateTime<Utc>,
    ) -> Result<u64, ArchiveError> {
        self.initialize().await?;

        let params = vec![
            Value::from(owner.to_string()),
            Value::from(fmt_ts(&before)),
        ];

        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM archive_item_tags WHERE item_seq IN \
             (SELECT seq FROM archive_items WHERE owner = ? AND timestamp < ?)",
            params.clone(),
        )
        .await
        .map_err(db_err)?;

        let removed = conn
            .execute(
                "DELETE FROM archive_items WHERE owner = ? AND timestamp < ?",
                params,
            )
            .await
            .map_err(db_err)?;

        debug!(removed, "expired items deleted");
        Ok(removed)
    }

    async fn resolve_stable_id(
        &self,
        owner: &BareJid,
        with: &BareJid,
        stanza_id: &str,
    ) -> Result<Option<String>, ArchiveError> {
        self.initialize().await?;

        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT stable_id FROM archive_items \
                 WHERE owner = ? AND with_jid = ? AND stanza_id = ? \
                 ORDER BY seq DESC LIMIT 1",
                vec![
                    Value::from(owner.to_string()),
                    Value::from(with.to_string()),
                    Value::from(stanza_id.to_string()),
                ],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn get_item(
        &self,
        owner: &BareJid,
        stable_id: &str,
    ) -> Result<Option<ArchivedItem>, ArchiveError> {
        self.initialize().await?;

        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT i.seq, i.with_jid, i.stable_id, i.stanza_id, i.direction, \
                 i.timestamp, i.payload \
                 FROM archive_items i WHERE i.owner = ? AND i.stable_id = ? LIMIT 1",
                vec![
                    Value::from(owner.to_string()),
                    Value::from(stable_id.to_string()),
                ],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };

        let (seq, mut item) = Self::item_from_row(owner, &row)?;
        let mut tags = self.tags_for(&conn, &[seq]).await?;
        if let Some(item_tags) = tags.remove(&seq) {
            item.tags = item_tags;
        }

        Ok(Some(item))
    }

    async fn load_settings(&self, owner: &BareJid) -> Result<Option<Settings>, ArchiveError> {
        self.initialize().await?;

        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT settings FROM archive_settings WHERE owner = ?",
                vec![Value::from(owner.to_string())],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let blob: String = row.get(0).map_err(db_err)?;
                Settings::from_blob(&blob).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, settings), fields(owner = %owner))]
    async fn store_settings(
        &self,
        owner: &BareJid,
        settings: &Settings,
    ) -> Result<(), ArchiveError> {
        self.initialize().await?;

        let blob = settings.to_blob()?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO archive_settings (owner, settings, updated_at) \
             VALUES (?, ?, ?)",
            vec![
                Value::from(owner.to_string()),
                Value::from(blob),
                Value::from(fmt_ts(&Utc::now())),
            ],
        )
        .await
        .map_err(db_err)?;

        debug!("settings persisted");
        Ok(())
    }

    async fn query_collections(
        &self,
        criteria: &QueryCriteria,
    ) -> Result<Vec<Collection>, ArchiveError> {
        self.initialize().await?;

        let mut sql = String::from(
            "SELECT DISTINCT i.with_jid, substr(i.timestamp, 1, 10) AS day \
             FROM archive_items i WHERE i.owner = ?",
        );
        let mut params: Vec<Value> = vec![Value::from(criteria.owner().to_string())];
        push_filters(criteria, &mut sql, &mut params);
        sql.push_str(" ORDER BY day ASC, i.with_jid ASC");

        let conn = self.conn.lock().await;
        let mut rows = conn.query(&sql, params).await.map_err(db_err)?;
        let mut collections = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let with_text: String = row.get(0).map_err(db_err)?;
            let day_text: String = row.get(1).map_err(db_err)?;

            let with = BareJid::new(&with_text).map_err(|e| {
                ArchiveError::StorageUnavailable(format!(
                    "corrupt peer address '{with_text}': {e}"
                ))
            })?;
            let day = NaiveDate::parse_from_str(&day_text, "%Y-%m-%d").map_err(|e| {
                ArchiveError::StorageUnavailable(format!("corrupt day bucket '{day_text}': {e}"))
            })?;
            let start = day
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .ok_or_else(|| {
                    ArchiveError::StorageUnavailable(format!("corrupt day bucket '{day_text}'"))
                })?;

            collections.push(Collection { with, start });
        }

        Ok(collections)
    }
}
