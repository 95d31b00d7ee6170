//! Categorised knowledge-base entries.

use crate::error::Result;
use crate::store::{self, like_pattern};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Entry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tags: String = row.get("tags")?;
        Ok(Self {
            id: row.get("id")?,
            category: row.get("category")?,
            title: row.get("title")?,
            content: row.get("content")?,
            tags: split_tags(&tags),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
}

pub fn add(
    conn: &Connection,
    category: &str,
    title: &str,
    content: &str,
    tags: &[String],
) -> Result<i64> {
    let now = store::now_ts();
    conn.execute(
        "INSERT INTO knowledge(category, title, content, tags, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?5)",
        params![category, title, content, tags.join(","), now],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, table = "knowledge", category, "entry added");
    Ok(id)
}

pub fn search(conn: &Connection, query: &str) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM knowledge WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\' OR tags LIKE ?1 ESCAPE '\\'
         ORDER BY updated_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([like_pattern(query)], Entry::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn by_category(conn: &Connection, category: &str) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM knowledge WHERE category = ?1 ORDER BY updated_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([category], Entry::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn categories(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT category FROM knowledge ORDER BY category")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_search_and_categories() {
        let conn = store::open_in_memory().expect("db");
        let tags = vec!["sqlite".to_string(), "perf".to_string()];
        let id = add(&conn, "database", "WAL mode", "Enable journal_mode=WAL", &tags).expect("add");
        add(&conn, "git", "Stash untracked", "git stash push -u", &[]).expect("add");

        let hits = search(&conn, "perf").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].tags, tags);

        assert_eq!(categories(&conn).expect("categories"), vec!["database", "git"]);
        assert_eq!(by_category(&conn, "git").expect("by category")[0].title, "Stash untracked");
    }
}
