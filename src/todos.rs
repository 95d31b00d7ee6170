//! Todos and per-project progress milestones.

use crate::domain::{Priority, TodoStatus};
use crate::error::Result;
use crate::store::{self, like_pattern};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

const PRIORITY_ORDER: &str =
    "CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: TodoStatus,
    pub priority: Priority,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
    pub proposal_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl Todo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tags: String = row.get("tags")?;
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            project: row.get("project")?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            due_date: row.get("due_date")?,
            proposal_id: row.get("proposal_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
}

pub fn add(conn: &Connection, todo: &NewTodo) -> Result<i64> {
    let now = store::now_ts();
    conn.execute(
        "INSERT INTO todos(title, description, status, priority, project, tags, due_date, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            todo.title,
            todo.description,
            TodoStatus::Todo,
            todo.priority.unwrap_or(Priority::Medium),
            todo.project,
            serde_json::to_string(&todo.tags)?,
            todo.due_date,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, table = "todos", "todo added");
    Ok(id)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Todo>> {
    Ok(conn.query_row("SELECT * FROM todos WHERE id = ?1", [id], Todo::from_row).optional()?)
}

/// Todos ordered urgent first, then oldest first.
pub fn list(
    conn: &Connection,
    status: Option<TodoStatus>,
    project: Option<&str>,
) -> Result<Vec<Todo>> {
    let sql = format!(
        "SELECT * FROM todos WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR project = ?2)
         ORDER BY {PRIORITY_ORDER}, created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![status, project], Todo::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Open todos grouped by priority, urgent first.
pub fn by_priority(conn: &Connection) -> Result<Vec<(Priority, Vec<Todo>)>> {
    let open: Vec<Todo> =
        list(conn, None, None)?.into_iter().filter(|t| t.status != TodoStatus::Done).collect();
    let mut groups: Vec<(Priority, Vec<Todo>)> = Vec::new();
    for todo in open {
        match groups.last_mut() {
            Some((priority, items)) if *priority == todo.priority => items.push(todo),
            _ => groups.push((todo.priority, vec![todo])),
        }
    }
    Ok(groups)
}

pub fn search(conn: &Connection, query: &str) -> Result<Vec<Todo>> {
    let sql = format!(
        "SELECT * FROM todos WHERE title LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
         ORDER BY {PRIORITY_ORDER}, created_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([like_pattern(query)], Todo::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Update status and/or priority. Moving to `done` stamps `completed_at`;
/// any other status clears it. Returns false when nothing matched.
pub fn update(
    conn: &Connection,
    id: i64,
    status: Option<TodoStatus>,
    priority: Option<Priority>,
) -> Result<bool> {
    if status.is_none() && priority.is_none() {
        return Ok(false);
    }
    let now = store::now_ts();
    let mut sets = vec!["updated_at = ?"];
    let mut values = vec![Value::from(now.clone())];
    if let Some(status) = status {
        sets.push("status = ?");
        values.push(Value::from(status.as_str().to_string()));
        sets.push("completed_at = ?");
        values.push(if status == TodoStatus::Done { Value::from(now) } else { Value::Null });
    }
    if let Some(priority) = priority {
        sets.push("priority = ?");
        values.push(Value::from(priority.as_str().to_string()));
    }
    values.push(Value::from(id));

    let sql = format!("UPDATE todos SET {} WHERE id = ?", sets.join(", "));
    let changed = conn.execute(&sql, params_from_iter(values))?;
    tracing::debug!(id, table = "todos", changed, "todo updated");
    Ok(changed > 0)
}

/// Count of todos per status.
pub fn counts(conn: &Connection) -> Result<Vec<(TodoStatus, i64)>> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM todos GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub id: i64,
    pub project: String,
    pub milestone: String,
    pub status: String,
    pub progress: i64,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Milestone {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            project: row.get("project")?,
            milestone: row.get("milestone")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            notes: row.get("notes")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn add_progress(
    conn: &Connection,
    project: &str,
    milestone: &str,
    status: &str,
    progress: i64,
    notes: &str,
) -> Result<i64> {
    let now = store::now_ts();
    conn.execute(
        "INSERT INTO progress(project, milestone, status, progress, notes, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![project, milestone, status, progress.clamp(0, 100), notes, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update whichever fields are given. Returns false when nothing changed.
pub fn update_progress(
    conn: &Connection,
    id: i64,
    status: Option<&str>,
    progress: Option<i64>,
    notes: Option<&str>,
) -> Result<bool> {
    let mut sets = Vec::new();
    let mut values = Vec::new();
    if let Some(status) = status.filter(|s| !s.is_empty()) {
        sets.push("status = ?");
        values.push(Value::from(status.to_string()));
    }
    if let Some(progress) = progress {
        sets.push("progress = ?");
        values.push(Value::from(progress.clamp(0, 100)));
    }
    if let Some(notes) = notes.filter(|n| !n.is_empty()) {
        sets.push("notes = ?");
        values.push(Value::from(notes.to_string()));
    }
    if sets.is_empty() {
        return Ok(false);
    }
    sets.push("updated_at = ?");
    values.push(Value::from(store::now_ts()));
    values.push(Value::from(id));

    let sql = format!("UPDATE progress SET {} WHERE id = ?", sets.join(", "));
    Ok(conn.execute(&sql, params_from_iter(values))? > 0)
}

pub fn list_progress(conn: &Connection, project: Option<&str>) -> Result<Vec<Milestone>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM progress WHERE ?1 IS NULL OR project = ?1
         ORDER BY project, updated_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([project], Milestone::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
