//! Working sessions: conversation history, per-session key/value state and
//! bookmarks.

use crate::domain::SessionStatus;
use crate::error::{Result, WsError};
use crate::store::{self, like_pattern};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub context: Value,
    pub status: SessionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl Session {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let context: String = row.get("context")?;
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            title: row.get("title")?,
            context: serde_json::from_str(&context).unwrap_or(Value::Null),
            status: row.get("status")?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: String,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: String,
}

impl Message {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let metadata: Option<String> = row.get("metadata")?;
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            role: row.get("role")?,
            content: row.get("content")?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bookmark {
    pub id: i64,
    pub session_id: i64,
    pub message_id: Option<i64>,
    pub label: String,
    pub created_at: String,
}

pub fn start(
    conn: &Connection,
    user: &str,
    title: Option<&str>,
    context: Option<&Value>,
) -> Result<i64> {
    let now = store::now();
    let title = match title {
        Some(title) => title.to_string(),
        None => format!("Session {}", now.format("%Y-%m-%d")),
    };
    let context = context.map(Value::to_string).unwrap_or_else(|| "{}".to_string());
    conn.execute(
        "INSERT INTO sessions(username, title, context, started_at) VALUES(?1, ?2, ?3, ?4)",
        params![user, title, context, store::format_ts(now)],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, user, "session started");
    Ok(id)
}

pub fn end(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = ?4",
        params![SessionStatus::Ended, store::now_ts(), id, SessionStatus::Active],
    )?;
    Ok(changed > 0)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Session>> {
    Ok(conn.query_row("SELECT * FROM sessions WHERE id = ?1", [id], Session::from_row).optional()?)
}

/// The user's most recently started active session.
pub fn active(conn: &Connection, user: &str) -> Result<Option<Session>> {
    Ok(conn
        .query_row(
            "SELECT * FROM sessions WHERE username = ?1 AND status = ?2
             ORDER BY started_at DESC, id DESC LIMIT 1",
            params![user, SessionStatus::Active],
            Session::from_row,
        )
        .optional()?)
}

/// Reuse the active session or start a new one. The flag is `true` for a new session.
pub fn resume(conn: &Connection, user: &str) -> Result<(i64, bool)> {
    match active(conn, user)? {
        Some(session) => Ok((session.id, false)),
        None => Ok((start(conn, user, None, None)?, true)),
    }
}

pub fn list(conn: &Connection, user: &str, limit: usize) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM sessions WHERE username = ?1 ORDER BY started_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user, limit as i64], Session::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update_context(conn: &Connection, id: i64, context: &Value) -> Result<()> {
    let changed = conn.execute(
        "UPDATE sessions SET context = ?1 WHERE id = ?2",
        params![context.to_string(), id],
    )?;
    if changed == 0 {
        return Err(WsError::not_found("session", id));
    }
    Ok(())
}

// === Messages ===

pub fn add_message(
    conn: &Connection,
    session_id: i64,
    role: &str,
    content: &str,
    metadata: Option<&Value>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO session_messages(session_id, role, content, metadata, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![session_id, role, content, metadata.map(Value::to_string), store::now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The newest `limit` messages of a session, oldest first.
pub fn messages(conn: &Connection, session_id: i64, limit: usize) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM session_messages WHERE session_id = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![session_id, limit as i64], Message::from_row)?;
    let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    messages.reverse();
    Ok(messages)
}

/// Messages across all of a user's sessions containing `query`, paired with
/// the session title.
pub fn search_messages(conn: &Connection, user: &str, query: &str) -> Result<Vec<(Message, String)>> {
    let mut stmt = conn.prepare(
        "SELECT m.*, s.title AS session_title FROM session_messages m
         JOIN sessions s ON m.session_id = s.id
         WHERE s.username = ?1 AND m.content LIKE ?2 ESCAPE '\\'
         ORDER BY m.created_at DESC, m.id DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![user, like_pattern(query), SEARCH_LIMIT], |row| {
        Ok((Message::from_row(row)?, row.get("session_title")?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// === State ===

pub fn set_state(conn: &Connection, session_id: i64, key: &str, value: &Value) -> Result<()> {
    conn.execute(
        "INSERT INTO session_state(session_id, key, value, updated_at) VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value,
                                                    updated_at = excluded.updated_at",
        params![session_id, key, value.to_string(), store::now_ts()],
    )?;
    Ok(())
}

pub fn get_state(conn: &Connection, session_id: i64, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM session_state WHERE session_id = ?1 AND key = ?2",
            params![session_id, key],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|v| serde_json::from_str(&v).map_err(WsError::from)).transpose()
}

pub fn all_state(conn: &Connection, session_id: i64) -> Result<BTreeMap<String, Value>> {
    let mut stmt = conn.prepare("SELECT key, value FROM session_state WHERE session_id = ?1")?;
    let rows = stmt.query_map([session_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut state = BTreeMap::new();
    for row in rows {
        let (key, raw) = row?;
        state.insert(key, serde_json::from_str(&raw)?);
    }
    Ok(state)
}

// === Bookmarks ===

pub fn add_bookmark(
    conn: &Connection,
    session_id: i64,
    label: &str,
    message_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO session_bookmarks(session_id, message_id, label, created_at)
         VALUES(?1, ?2, ?3, ?4)",
        params![session_id, message_id, label, store::now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn bookmarks(conn: &Connection, session_id: i64) -> Result<Vec<Bookmark>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, message_id, label, created_at FROM session_bookmarks
         WHERE session_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([session_id], |row| {
        Ok(Bookmark {
            id: row.get(0)?,
            session_id: row.get(1)?,
            message_id: row.get(2)?,
            label: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session: Session,
    pub messages: i64,
    pub bookmarks: i64,
    pub state_vars: i64,
}

pub fn summary(conn: &Connection, session_id: i64) -> Result<Option<SessionSummary>> {
    let Some(session) = get(conn, session_id)? else {
        return Ok(None);
    };
    let count = |table: &str| -> Result<i64> {
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE session_id = ?1"),
            [session_id],
            |row| row.get(0),
        )?)
    };
    Ok(Some(SessionSummary {
        messages: count("session_messages")?,
        bookmarks: count("session_bookmarks")?,
        state_vars: count("session_state")?,
        session,
    }))
}

/// Number of sessions currently active across all users.
pub fn active_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE status = ?1",
        [SessionStatus::Active],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_uses_dated_default_title() {
        let conn = store::open_in_memory().expect("db");
        let id = start(&conn, "ana", None, None).expect("start");
        let session = get(&conn, id).expect("get").expect("exists");
        assert!(session.title.starts_with("Session 20"));
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.context, json!({}));
    }

    #[test]
    fn resume_reuses_active_session_until_ended() {
        let conn = store::open_in_memory().expect("db");
        let (first, is_new) = resume(&conn, "ana").expect("resume");
        assert!(is_new);
        assert_eq!(resume(&conn, "ana").expect("resume"), (first, false));

        assert!(end(&conn, first).expect("end"));
        assert!(!end(&conn, first).expect("end twice"));
        let (second, is_new) = resume(&conn, "ana").expect("resume");
        assert!(is_new);
        assert_ne!(first, second);
        assert_eq!(list(&conn, "ana", 10).expect("list").len(), 2);
    }

    #[test]
    fn messages_come_back_chronologically() {
        let conn = store::open_in_memory().expect("db");
        let id = start(&conn, "ana", Some("Planning"), None).expect("start");
        for i in 0..5 {
            add_message(&conn, id, "user", &format!("message {i}"), None).expect("add");
        }
        let last_three = messages(&conn, id, 3).expect("messages");
        let contents: Vec<_> = last_three.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);

        let hits = search_messages(&conn, "ana", "message 4").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, "Planning");
        assert!(search_messages(&conn, "bob", "message").expect("search").is_empty());
    }

    #[test]
    fn state_is_upserted() {
        let conn = store::open_in_memory().expect("db");
        let id = start(&conn, "ana", None, None).expect("start");
        set_state(&conn, id, "step", &json!(1)).expect("set");
        set_state(&conn, id, "step", &json!({"n": 2})).expect("set");
        assert_eq!(get_state(&conn, id, "step").expect("get"), Some(json!({"n": 2})));
        assert_eq!(get_state(&conn, id, "missing").expect("get"), None);
        assert_eq!(all_state(&conn, id).expect("all").len(), 1);
    }

    #[test]
    fn summary_counts_children() {
        let conn = store::open_in_memory().expect("db");
        let id = start(&conn, "ana", None, Some(&json!({"project": "ws"}))).expect("start");
        let msg = add_message(&conn, id, "assistant", "done", Some(&json!({"tokens": 3})))
            .expect("add");
        add_bookmark(&conn, id, "milestone", Some(msg)).expect("bookmark");
        set_state(&conn, id, "k", &json!("v")).expect("state");

        let summary = summary(&conn, id).expect("summary").expect("exists");
        assert_eq!((summary.messages, summary.bookmarks, summary.state_vars), (1, 1, 1));
        assert_eq!(summary.session.context["project"], "ws");
        assert_eq!(bookmarks(&conn, id).expect("bookmarks")[0].message_id, Some(msg));
        assert!(super::summary(&conn, 999).expect("summary").is_none());
    }
}
