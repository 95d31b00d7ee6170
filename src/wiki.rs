//! Wiki pages keyed by a unique path, plus the markdown importer.

use crate::config::DocMapping;
use crate::error::Result;
use crate::store::{self, insert_unique, like_pattern};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fs;
use std::path::Path;

const IMPORT_LINES: usize = 30;
const IMPORT_FALLBACK_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WikiPage {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl WikiPage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            path: row.get("path")?,
            title: row.get("title")?,
            content: row.get("content")?,
            parent_id: row.get("parent_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Create a page. `None` when `path` is already taken.
pub fn create(
    conn: &Connection,
    path: &str,
    title: &str,
    content: &str,
    parent_id: Option<i64>,
) -> Result<Option<i64>> {
    let now = store::now_ts();
    insert_unique(
        conn,
        "INSERT INTO wiki(path, title, content, parent_id, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?5)",
        params![path, title, content, parent_id, now],
    )
}

pub fn get(conn: &Connection, path: &str) -> Result<Option<WikiPage>> {
    Ok(conn.query_row("SELECT * FROM wiki WHERE path = ?1", [path], WikiPage::from_row).optional()?)
}

/// First page whose title contains `fragment`, exact matches first.
pub fn find_by_title(conn: &Connection, fragment: &str) -> Result<Option<WikiPage>> {
    Ok(conn
        .query_row(
            "SELECT * FROM wiki WHERE title LIKE ?1 ESCAPE '\\'
             ORDER BY (title = ?2) DESC, title LIMIT 1",
            params![like_pattern(fragment), fragment],
            WikiPage::from_row,
        )
        .optional()?)
}

pub fn update(conn: &Connection, path: &str, content: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE wiki SET content = ?1, updated_at = ?2 WHERE path = ?3",
        params![content, store::now_ts(), path],
    )?;
    Ok(changed > 0)
}

/// Pages directly under `parent_id`, or top-level pages when `None`.
pub fn list(conn: &Connection, parent_id: Option<i64>) -> Result<Vec<WikiPage>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM wiki WHERE parent_id IS ?1 ORDER BY title",
    )?;
    let rows = stmt.query_map([parent_id], WikiPage::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn search(conn: &Connection, query: &str) -> Result<Vec<WikiPage>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM wiki WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\' ORDER BY title",
    )?;
    let rows = stmt.query_map([like_pattern(query)], WikiPage::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WikiStats {
    pub pages: i64,
    pub total_bytes: i64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

impl WikiStats {
    pub fn average_bytes(&self) -> i64 {
        if self.pages == 0 {
            0
        } else {
            self.total_bytes / self.pages
        }
    }
}

pub fn stats(conn: &Connection) -> Result<WikiStats> {
    Ok(conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(LENGTH(content)), 0), MIN(created_at), MAX(updated_at)
         FROM wiki",
        [],
        |row| {
            Ok(WikiStats {
                pages: row.get(0)?,
                total_bytes: row.get(1)?,
                oldest: row.get(2)?,
                newest: row.get(3)?,
            })
        },
    )?)
}

/// Lowercase, hyphen-separated page path for `title`.
pub fn slugify(title: &str) -> String {
    title.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

/// The leading non-blank lines of a document, or its first characters when
/// it has none.
pub fn excerpt(content: &str) -> String {
    let lines: Vec<&str> =
        content.lines().filter(|l| !l.trim().is_empty()).take(IMPORT_LINES).collect();
    if lines.is_empty() {
        store::truncate(content, IMPORT_FALLBACK_CHARS)
    } else {
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulateReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub missing: Vec<String>,
}

/// Import mapped markdown files as wiki pages, updating pages whose title
/// already exists.
pub fn populate(conn: &mut Connection, root: &Path, docs: &[DocMapping]) -> Result<PopulateReport> {
    let mut report = PopulateReport::default();
    let tx = conn.transaction()?;
    let now = store::now_ts();

    for doc in docs {
        let file = root.join(&doc.file);
        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(file = %file.display(), error = %e, "doc not imported");
                report.missing.push(doc.file.display().to_string());
                continue;
            }
        };
        let body = excerpt(&content);

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM wiki WHERE title = ?1", [&doc.title], |row| row.get(0))
            .optional()?;
        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE wiki SET content = ?1, updated_at = ?2 WHERE id = ?3",
                    params![body, now, id],
                )?;
                report.updated.push(doc.title.clone());
            }
            None => {
                tx.execute(
                    "INSERT INTO wiki(path, title, content, created_at, updated_at)
                     VALUES(?1, ?2, ?3, ?4, ?4)",
                    params![slugify(&doc.title), doc.title, body, now],
                )?;
                report.added.push(doc.title.clone());
            }
        }
    }

    tx.commit()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn create_then_get_round_trips() {
        let conn = store::open_in_memory().expect("db");
        let id = create(&conn, "guides/setup", "Setup", "Run ws init", None)
            .expect("create")
            .expect("new page");
        let page = get(&conn, "guides/setup").expect("get").expect("exists");
        assert_eq!(page.id, id);
        assert_eq!(page.title, "Setup");
        assert_eq!(page.content, "Run ws init");
        assert_eq!(page.parent_id, None);
    }

    #[test]
    fn duplicate_path_returns_none() {
        let conn = store::open_in_memory().expect("db");
        assert!(create(&conn, "a", "A", "x", None).expect("create").is_some());
        assert_eq!(create(&conn, "a", "Other", "y", None).expect("create"), None);
    }

    #[test]
    fn list_respects_parent() {
        let conn = store::open_in_memory().expect("db");
        let root = create(&conn, "root", "Root", "", None).expect("create").expect("id");
        create(&conn, "root/child", "Child", "", Some(root)).expect("create");
        assert_eq!(list(&conn, None).expect("list").len(), 1);
        assert_eq!(list(&conn, Some(root)).expect("list")[0].path, "root/child");
    }

    #[test]
    fn search_matches_title_and_content() {
        let conn = store::open_in_memory().expect("db");
        create(&conn, "a", "Backups", "rotation keeps dailies", None).expect("create");
        create(&conn, "b", "Tools", "register tools", None).expect("create");
        assert_eq!(search(&conn, "rotation").expect("search").len(), 1);
        assert_eq!(search(&conn, "tools").expect("search").len(), 1);
        assert_eq!(stats(&conn).expect("stats").pages, 2);
    }

    #[test]
    fn excerpt_keeps_thirty_non_blank_lines() {
        let doc: String = (0..50).map(|i| format!("line {i}\n\n")).collect();
        let text = excerpt(&doc);
        assert_eq!(text.lines().count(), 30);
        assert!(text.starts_with("line 0\nline 1"));
    }

    #[test]
    fn populate_adds_then_updates() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("README.md"), "# Workspace\n\nQuick start text\n").expect("write");
        let docs = vec![
            DocMapping { file: PathBuf::from("README.md"), title: "Quick Start".to_string() },
            DocMapping { file: PathBuf::from("MISSING.md"), title: "Missing".to_string() },
        ];

        let mut conn = store::open_in_memory().expect("db");
        let first = populate(&mut conn, tmp.path(), &docs).expect("populate");
        assert_eq!(first.added, vec!["Quick Start"]);
        assert_eq!(first.missing, vec!["MISSING.md"]);

        let page = get(&conn, "quick-start").expect("get").expect("exists");
        assert_eq!(page.content, "# Workspace\nQuick start text");

        let second = populate(&mut conn, tmp.path(), &docs).expect("populate");
        assert_eq!(second.updated, vec!["Quick Start"]);
        assert!(second.added.is_empty());
    }
}
