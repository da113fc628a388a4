//! Read-only queries against the CloudBerry history log (`cbbackup.db`).
//!
//! Plan ids come from plan documents on disk, so they are data, not
//! trusted SQL: every query binds them as parameters.

use rusqlite::{params, Connection, OpenFlags, Result, Row};
use std::path::Path;

/// Open the history log read-only. The collector never writes, so no
/// locking concerns against a concurrently running backup agent.
///
/// SQLite opens lazily; the schema-version pragma forces the header read
/// so an unreadable or non-database file fails here, not mid-pipeline.
pub fn open_read_only(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;
    Ok(conn)
}

/// One `session_history` row: the aggregate record of a single job run.
#[derive(Debug)]
pub struct SessionRow {
    /// Session id, correlates `history` rows to this run.
    pub id: i64,
    pub plan_id: String,
    /// Fixed-width `YYYYMMDDHHMMSS` UTC start time, as stored.
    pub date_start_utc: String,
    /// Run duration in seconds.
    pub duration: i64,
    /// Raw result code. 6 is success; see `metrics::status_label`.
    pub result: i64,
    pub uploaded_count: i64,
    pub scanned_count: i64,
    pub purged_count: i64,
    pub total_count: i64,
    pub failed_count: i64,
    pub uploaded_size: f64,
    pub scanned_size: f64,
    pub total_size: f64,
}

/// One `history` row: a single file operation performed during a session.
/// Correlation to the session happens in the query (plan id plus session
/// id, or the timestamp window), so only the payload columns come back.
#[derive(Debug)]
pub struct ItemRow {
    /// Raw operation code. 0 purge, 1 backup; see `metrics::operation_label`.
    pub operation: i64,
    pub local_path: String,
    pub size: f64,
    pub date_finished_utc: String,
}

const SESSION_COLUMNS: &str = "id, plan_id, date_start_utc, duration, result, \
     uploaded_count, scanned_count, purged_count, total_count, failed_count, \
     uploaded_size, scanned_size, total_size";

const ITEM_COLUMNS: &str = "operation, local_path, size, date_finished_utc";

/// Fetch the most recent session for a plan, or None if it has never run.
///
/// Most recent means highest `date_start_utc`; the fixed-width encoding
/// makes text ordering chronological. Ties fall to the log's native row
/// order. A row that fails to scan is logged and treated as absent.
pub fn latest_session(conn: &Connection, plan_id: &str) -> Result<Option<SessionRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM session_history \
         WHERE plan_id = ?1 ORDER BY date_start_utc DESC LIMIT 1"
    ))?;
    let mut rows = stmt.query(params![plan_id])?;
    match rows.next()? {
        Some(row) => match map_session(row) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, plan_id, "skipping malformed session_history row");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Fetch the file operations of one session, oldest first.
///
/// Malformed rows are logged and skipped; the rest of the result set is
/// still returned.
pub fn session_items(conn: &Connection, plan_id: &str, session_id: i64) -> Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM history \
         WHERE plan_id = ?1 AND session_id = ?2 ORDER BY date_finished_utc ASC"
    ))?;
    let mut rows = stmt.query(params![plan_id, session_id])?;
    collect_items(&mut rows, plan_id)
}

/// Window-join fallback for logs without a usable session key: file
/// operations that finished between the session's start and start plus
/// duration, oldest first. Bounds are fixed-width timestamps, compared
/// as text.
pub fn session_items_in_window(
    conn: &Connection,
    plan_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM history \
         WHERE plan_id = ?1 AND date_finished_utc BETWEEN ?2 AND ?3 \
         ORDER BY date_finished_utc ASC"
    ))?;
    let mut rows = stmt.query(params![plan_id, start, end])?;
    collect_items(&mut rows, plan_id)
}

fn collect_items(rows: &mut rusqlite::Rows<'_>, plan_id: &str) -> Result<Vec<ItemRow>> {
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        match map_item(row) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(error = %e, plan_id, "skipping malformed history row");
            }
        }
    }
    Ok(items)
}

fn map_session(row: &Row) -> Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        date_start_utc: row.get(2)?,
        duration: row.get(3)?,
        result: row.get(4)?,
        uploaded_count: row.get(5)?,
        scanned_count: row.get(6)?,
        purged_count: row.get(7)?,
        total_count: row.get(8)?,
        failed_count: row.get(9)?,
        uploaded_size: row.get(10)?,
        scanned_size: row.get(11)?,
        total_size: row.get(12)?,
    })
}

fn map_item(row: &Row) -> Result<ItemRow> {
    Ok(ItemRow {
        operation: row.get(0)?,
        local_path: row.get(1)?,
        size: row.get(2)?,
        date_finished_utc: row.get(3)?,
    })
}

#[cfg(test)]
pub(crate) fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE session_history (
            id              INTEGER PRIMARY KEY,
            destination_id  INTEGER,
            plan_id         TEXT,
            date_start_utc  TEXT,
            duration        INTEGER,
            result          INTEGER,
            uploaded_count  INTEGER,
            uploaded_size   REAL,
            scanned_count   INTEGER,
            scanned_size    REAL,
            purged_count    INTEGER,
            total_count     INTEGER,
            total_size      REAL,
            failed_count    INTEGER,
            error_message   TEXT
        );
        CREATE TABLE history (
            id                INTEGER PRIMARY KEY,
            destination_id    INTEGER,
            plan_id           TEXT,
            local_path        TEXT,
            operation         INTEGER,
            duration          INTEGER,
            date_finished_utc TEXT,
            size              REAL,
            session_id        INTEGER
        );",
    )
}

#[cfg(test)]
pub(crate) fn insert_session(
    conn: &Connection,
    id: i64,
    plan_id: &str,
    date_start_utc: &str,
    duration: i64,
    result: i64,
    uploaded_count: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO session_history (
            id, plan_id, date_start_utc, duration, result,
            uploaded_count, uploaded_size, scanned_count, scanned_size,
            purged_count, total_count, total_size, failed_count
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1024.0, 10, 4096.0, 0, 10, 2048.0, 0)",
        params![id, plan_id, date_start_utc, duration, result, uploaded_count],
    )?;
    Ok(())
}
