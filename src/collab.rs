//! Users, discussions, assignments and notifications.
//!
//! Notifications are sent after the triggering write has committed. A failed
//! notification is logged and does not undo the write.

use crate::domain::DiscussionStatus;
use crate::error::Result;
use crate::store::{self, insert_unique};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

pub const MAINTAINER: &str = "maintainer";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub email: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discussion {
    pub id: i64,
    pub title: String,
    pub context_type: Option<String>,
    pub context_id: Option<i64>,
    pub proposal_id: Option<i64>,
    pub status: DiscussionStatus,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Discussion {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            context_type: row.get("context_type")?,
            context_id: row.get("context_id")?,
            proposal_id: row.get("proposal_id")?,
            status: row.get("status")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub discussion_id: i64,
    pub author: String,
    pub content: String,
    pub reply_to: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub assigned_to: String,
    pub assigned_by: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub username: String,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: String,
}

/// What a discussion is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context<'a> {
    pub kind: &'a str,
    pub id: i64,
}

// === Users ===

pub fn add_user(
    conn: &Connection,
    username: &str,
    role: &str,
    email: Option<&str>,
) -> Result<Option<i64>> {
    insert_unique(
        conn,
        "INSERT INTO users(username, role, email, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![username, role, email, store::now_ts()],
    )
}

pub fn get_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, username, role, email, active, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?)
}

pub fn update_role(conn: &Connection, username: &str, role: &str) -> Result<bool> {
    Ok(conn.execute("UPDATE users SET role = ?1 WHERE username = ?2", [role, username])? > 0)
}

pub fn list_users(conn: &Connection, role: Option<&str>) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, role, email, active, created_at FROM users
         WHERE ?1 IS NULL OR role = ?1 ORDER BY username",
    )?;
    let rows = stmt.query_map([role], user_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role: row.get(2)?,
        email: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// === Discussions ===

/// Open a discussion and notify every active maintainer.
pub fn start(
    conn: &Connection,
    title: &str,
    created_by: &str,
    context: Option<Context<'_>>,
) -> Result<i64> {
    let id = insert_discussion(conn, title, created_by, context)?;
    let link = format!("discussion:{id}");
    notify_best_effort(notify_role(
        conn,
        MAINTAINER,
        "discussion",
        &format!("New discussion: {title}"),
        Some(link.as_str()),
    ));
    Ok(id)
}

pub(crate) fn insert_discussion(
    conn: &Connection,
    title: &str,
    created_by: &str,
    context: Option<Context<'_>>,
) -> Result<i64> {
    let now = store::now_ts();
    let proposal_id = context.filter(|c| c.kind == "proposal").map(|c| c.id);
    conn.execute(
        "INSERT INTO discussions(title, context_type, context_id, proposal_id, created_by, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![title, context.map(|c| c.kind), context.map(|c| c.id), proposal_id, created_by, now],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, table = "discussions", "discussion started");
    Ok(id)
}

/// Append a comment and notify earlier commenters and the creator, except
/// the author.
pub fn add_comment(
    conn: &mut Connection,
    discussion_id: i64,
    author: &str,
    content: &str,
    reply_to: Option<i64>,
) -> Result<i64> {
    let now = store::now_ts();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO comments(discussion_id, author, content, reply_to, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![discussion_id, author, content, reply_to, now],
    )?;
    let comment_id = tx.last_insert_rowid();
    tx.execute("UPDATE discussions SET updated_at = ?1 WHERE id = ?2", params![now, discussion_id])?;
    tx.commit()?;

    notify_best_effort(notify_participants(conn, discussion_id, author));
    Ok(comment_id)
}

fn notify_participants(conn: &Connection, discussion_id: i64, author: &str) -> Result<()> {
    let mut participants: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT author FROM comments WHERE discussion_id = ?1 AND author != ?2
             ORDER BY author",
        )?;
        let rows = stmt.query_map(params![discussion_id, author], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    let creator: Option<String> = conn
        .query_row("SELECT created_by FROM discussions WHERE id = ?1", [discussion_id], |row| row.get(0))
        .optional()?;
    if let Some(creator) = creator {
        if creator != author && !participants.contains(&creator) {
            participants.push(creator);
        }
    }

    let link = format!("discussion:{discussion_id}");
    for user in participants {
        notify_user(
            conn,
            &user,
            "comment",
            &format!("{author} commented on discussion"),
            Some(link.as_str()),
        )?;
    }
    Ok(())
}

pub fn close(conn: &Connection, discussion_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE discussions SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![DiscussionStatus::Closed, store::now_ts(), discussion_id],
    )?;
    Ok(changed > 0)
}

pub fn list(
    conn: &Connection,
    status: Option<DiscussionStatus>,
    context_type: Option<&str>,
) -> Result<Vec<Discussion>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM discussions WHERE (?1 IS NULL OR status = ?1)
           AND (?2 IS NULL OR context_type = ?2)
         ORDER BY updated_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![status, context_type], Discussion::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_with_comments(
    conn: &Connection,
    discussion_id: i64,
) -> Result<Option<(Discussion, Vec<Comment>)>> {
    let Some(discussion) = conn
        .query_row("SELECT * FROM discussions WHERE id = ?1", [discussion_id], Discussion::from_row)
        .optional()?
    else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT id, discussion_id, author, content, reply_to, created_at FROM comments
         WHERE discussion_id = ?1 ORDER BY created_at, id",
    )?;
    let comments = stmt
        .query_map([discussion_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                discussion_id: row.get(1)?,
                author: row.get(2)?,
                content: row.get(3)?,
                reply_to: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some((discussion, comments)))
}

// === Assignments ===

pub fn assign(
    conn: &Connection,
    item_type: &str,
    item_id: i64,
    assigned_to: &str,
    assigned_by: &str,
) -> Result<i64> {
    let now = store::now_ts();
    conn.execute(
        "INSERT INTO assignments(item_type, item_id, assigned_to, assigned_by, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?5)",
        params![item_type, item_id, assigned_to, assigned_by, now],
    )?;
    let id = conn.last_insert_rowid();
    let link = format!("{item_type}:{item_id}");
    notify_best_effort(notify_user(
        conn,
        assigned_to,
        "assignment",
        &format!("{assigned_by} assigned you {item_type} #{item_id}"),
        Some(link.as_str()),
    ));
    Ok(id)
}

pub fn update_assignment(conn: &Connection, id: i64, status: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE assignments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, store::now_ts(), id],
    )?;
    Ok(changed > 0)
}

pub fn list_assignments(
    conn: &Connection,
    user: Option<&str>,
    status: Option<&str>,
) -> Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_type, item_id, assigned_to, assigned_by, status, created_at, updated_at
         FROM assignments WHERE (?1 IS NULL OR assigned_to = ?1) AND (?2 IS NULL OR status = ?2)
         ORDER BY status, created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user, status], |row| {
        Ok(Assignment {
            id: row.get(0)?,
            item_type: row.get(1)?,
            item_id: row.get(2)?,
            assigned_to: row.get(3)?,
            assigned_by: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// === Notifications ===

fn notify_best_effort(result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "notification fan-out failed");
    }
}

pub fn notify_user(
    conn: &Connection,
    username: &str,
    kind: &str,
    message: &str,
    link: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications(username, kind, message, link, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![username, kind, message, link, store::now_ts()],
    )?;
    Ok(())
}

pub fn notify_role(
    conn: &Connection,
    role: &str,
    kind: &str,
    message: &str,
    link: Option<&str>,
) -> Result<()> {
    let users: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT username FROM users WHERE role = ?1 AND active = 1 ORDER BY username")?;
        let rows = stmt.query_map([role], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for user in users {
        notify_user(conn, &user, kind, message, link)?;
    }
    Ok(())
}

/// Unread notifications, or the latest 50 when `unread_only` is false.
pub fn notifications(conn: &Connection, username: &str, unread_only: bool) -> Result<Vec<Notification>> {
    let sql = if unread_only {
        "SELECT id, username, kind, message, link, read, created_at FROM notifications
         WHERE username = ?1 AND read = 0 ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT id, username, kind, message, link, read, created_at FROM notifications
         WHERE username = ?1 ORDER BY created_at DESC, id DESC LIMIT 50"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([username], |row| {
        Ok(Notification {
            id: row.get(0)?,
            username: row.get(1)?,
            kind: row.get(2)?,
            message: row.get(3)?,
            link: row.get(4)?,
            read: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn mark_read(conn: &Connection, notification_id: i64) -> Result<bool> {
    Ok(conn.execute("UPDATE notifications SET read = 1 WHERE id = ?1", [notification_id])? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_username_returns_none() {
        let conn = store::open_in_memory().expect("db");
        assert!(add_user(&conn, "alice", MAINTAINER, None).expect("add").is_some());
        assert_eq!(add_user(&conn, "alice", "contributor", None).expect("add"), None);
        let alice = get_user(&conn, "alice").expect("get").expect("exists");
        assert_eq!(alice.role, MAINTAINER);
        assert!(alice.active);
    }

    #[test]
    fn starting_discussion_notifies_maintainers() {
        let conn = store::open_in_memory().expect("db");
        add_user(&conn, "alice", MAINTAINER, None).expect("add");
        add_user(&conn, "bob", "contributor", None).expect("add");

        start(&conn, "Backup policy", "bob", None).expect("start");
        assert_eq!(notifications(&conn, "alice", true).expect("list").len(), 1);
        assert!(notifications(&conn, "bob", true).expect("list").is_empty());
    }

    #[test]
    fn comments_notify_participants_except_author() {
        let mut conn = store::open_in_memory().expect("db");
        let id = start(&conn, "Naming", "carol", None).expect("start");
        add_comment(&mut conn, id, "dave", "first", None).expect("comment");
        add_comment(&mut conn, id, "erin", "second", None).expect("comment");

        // carol: notified twice as creator; dave: once for erin's comment
        assert_eq!(notifications(&conn, "carol", true).expect("list").len(), 2);
        assert_eq!(notifications(&conn, "dave", true).expect("list").len(), 1);
        assert!(notifications(&conn, "erin", true).expect("list").is_empty());

        let (discussion, comments) = get_with_comments(&conn, id).expect("get").expect("exists");
        assert_eq!(discussion.status, DiscussionStatus::Open);
        assert_eq!(comments.len(), 2);
    }

    #[test]
    fn proposal_context_sets_typed_link() {
        let conn = store::open_in_memory().expect("db");
        let pid = crate::proposals::submit(&conn, &crate::proposals::NewProposal::new("t", "d"))
            .expect("submit");
        let id = start(&conn, "About it", "x", Some(Context { kind: "proposal", id: pid }))
            .expect("start");
        let (discussion, _) = get_with_comments(&conn, id).expect("get").expect("exists");
        assert_eq!(discussion.proposal_id, Some(pid));
        assert!(close(&conn, id).expect("close"));
        assert!(list(&conn, Some(DiscussionStatus::Open), None).expect("list").is_empty());
    }

    #[test]
    fn assignment_notifies_assignee_and_mark_read() {
        let conn = store::open_in_memory().expect("db");
        assign(&conn, "todo", 4, "frank", "gina").expect("assign");
        let unread = notifications(&conn, "frank", true).expect("list");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].link.as_deref(), Some("todo:4"));
        assert!(mark_read(&conn, unread[0].id).expect("mark"));
        assert!(notifications(&conn, "frank", true).expect("list").is_empty());
        assert_eq!(notifications(&conn, "frank", false).expect("list").len(), 1);
    }
}
