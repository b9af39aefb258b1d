//! SQLite-backed event store (persistence across restarts).

use crate::{
    AuditListOptions, AuditPage, AuditRecord, EventStore, NewAuditRecord, ResourceQuery, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

const SELECT_COLUMNS: &str = "id, audit_id, level, stage, verb, user, user_agent, \
     request_timestamp, stage_timestamp, api_group, api_version, resource, subresource, \
     namespace, name, raw";

/// SQLite-backed event store. Timestamps are stored as fixed-width RFC 3339 UTC text so
/// lexical order equals chronological order.
pub struct SqliteEventStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteEventStore {
    /// Open (or create) a store at the given path. `":memory:"` gives a private in-memory database.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Other(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                audit_id TEXT NOT NULL,
                level TEXT NOT NULL,
                stage TEXT NOT NULL,
                verb TEXT NOT NULL,
                user TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                request_timestamp TEXT NOT NULL,
                stage_timestamp TEXT NOT NULL,
                api_group TEXT NOT NULL DEFAULT '',
                api_version TEXT NOT NULL DEFAULT '',
                resource TEXT NOT NULL DEFAULT '',
                subresource TEXT NOT NULL DEFAULT '',
                namespace TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL DEFAULT '',
                raw TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_level_verb ON audit_events(level, verb);
            CREATE INDEX IF NOT EXISTS idx_audit_audit_id ON audit_events(audit_id);
            CREATE INDEX IF NOT EXISTS idx_audit_request_ts ON audit_events(request_timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_object
                ON audit_events(api_group, api_version, resource, namespace, name);
            "#,
        )
        .map_err(|e| StoreError::Other(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| StoreError::Other(e.to_string()))
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_record_row(row: &rusqlite::Row) -> Result<AuditRecord, rusqlite::Error> {
    Ok(AuditRecord::new(
        row.get(0)?,
        NewAuditRecord {
            audit_id: row.get(1)?,
            level: row.get(2)?,
            stage: row.get(3)?,
            verb: row.get(4)?,
            user: row.get(5)?,
            user_agent: row.get(6)?,
            request_timestamp: parse_ts(row, 7)?,
            stage_timestamp: parse_ts(row, 8)?,
            api_group: row.get(9)?,
            api_version: row.get(10)?,
            resource: row.get(11)?,
            subresource: row.get(12)?,
            namespace: row.get(13)?,
            name: row.get(14)?,
            raw: row.get(15)?,
        },
    ))
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append_batch(&self, records: &[NewAuditRecord]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for r in records {
                tx.execute(
                    "INSERT INTO audit_events (audit_id, level, stage, verb, user, user_agent, \
                     request_timestamp, stage_timestamp, api_group, api_version, resource, \
                     subresource, namespace, name, raw) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    rusqlite::params![
                        r.audit_id,
                        r.level,
                        r.stage,
                        r.verb,
                        r.user,
                        r.user_agent,
                        format_ts(&r.request_timestamp),
                        format_ts(&r.stage_timestamp),
                        r.api_group,
                        r.api_version,
                        r.resource,
                        r.subresource,
                        r.namespace,
                        r.name,
                        r.raw,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(records.len())
        })
    }

    async fn find_for_resource(
        &self,
        query: &ResourceQuery,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM audit_events \
                 WHERE api_group = ?1 AND api_version = ?2 AND resource = ?3 \
                 AND namespace = ?4 AND name = ?5 \
                 ORDER BY request_timestamp ASC, id ASC",
                SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map(
                rusqlite::params![
                    query.api_group,
                    query.api_version,
                    query.resource,
                    query.namespace,
                    query.name,
                ],
                parse_record_row,
            )?;
            let out = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(out)
        })
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<AuditPage, StoreError> {
        let (offset, limit) = opts.offset_limit();
        let (total, rows) = self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM audit_events \
                 WHERE (?1 IS NULL OR level = ?1) AND (?2 IS NULL OR stage = ?2)",
                rusqlite::params![opts.level, opts.stage],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM audit_events \
                 WHERE (?1 IS NULL OR level = ?1) AND (?2 IS NULL OR stage = ?2) \
                 ORDER BY id ASC LIMIT ?3 OFFSET ?4",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![opts.level, opts.stage, limit as i64, offset as i64],
                    parse_record_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((total, rows))
        })?;
        Ok(AuditPage::new(total.max(0) as usize, opts, rows))
    }
}
