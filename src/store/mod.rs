//! Access to the shared workspace database.
//!
//! The CLI opens one connection per process with [`open`] and hands it to
//! every operation. Entity modules take `&Connection` for single statements
//! and `&mut Connection` when they need a transaction.

pub mod schema;

use crate::error::{Result, WsError};
use chrono::{Local, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Params, Row};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Open (or create) the workspace database and apply the schema.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let conn = configure(Connection::open(path)?)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// In-memory database with the full schema.
pub fn open_in_memory() -> Result<Connection> {
    configure(Connection::open_in_memory()?)
}

fn configure(conn: Connection) -> Result<Connection> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::apply(&conn)?;
    tracing::debug!("workspace schema ready");
    Ok(conn)
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Stored timestamp form; sorts lexicographically.
pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn now_ts() -> String {
    format_ts(now())
}

pub fn parse_ts(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains("UNIQUE")
    )
}

/// Run an INSERT whose unique key may already exist. Returns the new row id,
/// or `None` when the key is taken.
pub fn insert_unique<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<i64>> {
    match conn.execute(sql, params) {
        Ok(_) => Ok(Some(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(error = %e, "unique key already present");
            Ok(None)
        }
        Err(e) => Err(WsError::Database(e)),
    }
}

/// Cut `text` to at most `max` characters.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Decode a JSON text column, surfacing malformed JSON as a conversion error.
pub fn json_column<T: DeserializeOwned>(row: &Row<'_>, name: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(name)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// `%query%` pattern for LIKE searches, with `%`, `_` and `\` in the
/// query escaped. Pair it with `LIKE ? ESCAPE '\'`.
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
