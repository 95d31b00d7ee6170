//! Capability registry, the workspace complexity score and resource
//! utilization samples.

use crate::domain::{ComplexityLevel, SessionStatus, ToolStatus};
use crate::error::Result;
use crate::store::{self, insert_unique, json_column};
use chrono::Duration;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::collections::BTreeMap;

const STALE_SESSION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capability {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub complexity: i64,
    pub dependencies: Vec<String>,
    pub usage_count: i64,
    pub last_used: Option<String>,
    pub created_at: String,
}

impl Capability {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: row.get("kind")?,
            description: row.get("description")?,
            complexity: row.get("complexity")?,
            dependencies: json_column(row, "dependencies")?,
            usage_count: row.get("usage_count")?,
            last_used: row.get("last_used")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Register a capability. `None` when the name is taken.
pub fn register_capability(
    conn: &Connection,
    name: &str,
    kind: &str,
    complexity: i64,
    dependencies: &[String],
) -> Result<Option<i64>> {
    insert_unique(
        conn,
        "INSERT INTO capabilities(name, kind, complexity, dependencies, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![name, kind, complexity, serde_json::to_string(dependencies)?, store::now_ts()],
    )
}

pub fn use_capability(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE capabilities SET usage_count = usage_count + 1, last_used = ?1 WHERE name = ?2",
        params![store::now_ts(), name],
    )?;
    Ok(changed > 0)
}

pub fn list_capabilities(conn: &Connection, kind: Option<&str>) -> Result<Vec<Capability>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM capabilities WHERE ?1 IS NULL OR kind = ?1 ORDER BY kind, complexity, name",
    )?;
    let rows = stmt.query_map([kind], Capability::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Capability name to the names it depends on.
pub fn capability_map(conn: &Connection) -> Result<BTreeMap<String, Vec<String>>> {
    Ok(list_capabilities(conn, None)?
        .into_iter()
        .map(|cap| (cap.name, cap.dependencies))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityReport {
    pub score: i64,
    pub capabilities: i64,
    pub total_complexity: i64,
    pub dependencies: i64,
    pub tools: i64,
    pub active_sessions: i64,
    pub level: ComplexityLevel,
}

/// Weighted sum over capabilities, their dependencies, active tools and active sessions.
pub fn complexity_score(conn: &Connection) -> Result<ComplexityReport> {
    let caps = list_capabilities(conn, None)?;
    let capabilities = caps.len() as i64;
    let total_complexity: i64 = caps.iter().map(|c| c.complexity).sum();
    let dependencies: i64 = caps.iter().map(|c| c.dependencies.len() as i64).sum();
    let tools: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tools WHERE status = ?1",
        [ToolStatus::Active],
        |row| row.get(0),
    )?;
    let active_sessions = crate::sessions::active_count(conn)?;

    let score = 2 * capabilities + total_complexity + 3 * dependencies + tools + active_sessions;
    Ok(ComplexityReport {
        score,
        capabilities,
        total_complexity,
        dependencies,
        tools,
        active_sessions,
        level: ComplexityLevel::from_score(score),
    })
}

/// Compute the current score and append it to the history.
pub fn record_complexity(conn: &Connection) -> Result<ComplexityReport> {
    let report = complexity_score(conn)?;
    conn.execute(
        "INSERT INTO complexity_history(score, level, breakdown, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![report.score, report.level, serde_json::to_string(&report)?, store::now_ts()],
    )?;
    Ok(report)
}

/// Recorded scores from the last `days`, oldest first.
pub fn complexity_history(conn: &Connection, days: i64) -> Result<Vec<(String, i64)>> {
    let cutoff = store::format_ts(store::now() - Duration::days(days));
    let mut stmt = conn.prepare(
        "SELECT created_at, score FROM complexity_history WHERE created_at > ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub kind: &'static str,
    pub message: String,
    pub impact: &'static str,
    pub items: Vec<String>,
}

fn names(conn: &Connection, sql: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn suggest_simplification(conn: &Connection) -> Result<Vec<Suggestion>> {
    let mut suggestions = Vec::new();

    let unused = names(conn, "SELECT name FROM capabilities WHERE usage_count = 0 ORDER BY name")?;
    if !unused.is_empty() {
        suggestions.push(Suggestion {
            kind: "remove_unused",
            message: format!("Remove {} unused capabilities", unused.len()),
            impact: "medium",
            items: unused,
        });
    }

    let failing = names(
        conn,
        "SELECT name FROM tools WHERE usage_count > 0
           AND CAST(failure_count AS REAL) / usage_count > 0.5 ORDER BY name",
    )?;
    if !failing.is_empty() {
        suggestions.push(Suggestion {
            kind: "fix_or_remove",
            message: format!("Fix or remove {} failing tools", failing.len()),
            impact: "high",
            items: failing,
        });
    }

    let cutoff = store::format_ts(store::now() - Duration::days(STALE_SESSION_DAYS));
    let stale: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM sessions WHERE status = ?1 AND started_at < ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![SessionStatus::Active, cutoff], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    if !stale.is_empty() {
        suggestions.push(Suggestion {
            kind: "cleanup",
            message: format!("Clean up {} old sessions", stale.len()),
            impact: "low",
            items: stale.iter().map(|id| format!("#{id}")).collect(),
        });
    }
    Ok(suggestions)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utilization {
    pub resource: String,
    pub used: f64,
    pub total: f64,
    pub percent: f64,
    pub created_at: String,
}

pub fn record_utilization(conn: &Connection, resource: &str, used: f64, total: f64) -> Result<f64> {
    let percent = if total > 0.0 { used / total * 100.0 } else { 0.0 };
    conn.execute(
        "INSERT INTO utilization(resource, used, total, percent, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![resource, used, total, percent, store::now_ts()],
    )?;
    Ok(percent)
}

/// Latest sample for each resource.
pub fn utilization_summary(conn: &Connection) -> Result<Vec<Utilization>> {
    let mut stmt = conn.prepare(
        "SELECT resource, used, total, percent, created_at FROM utilization
         WHERE id IN (SELECT MAX(id) FROM utilization GROUP BY resource)
         ORDER BY resource",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Utilization {
            resource: row.get(0)?,
            used: row.get(1)?,
            total: row.get(2)?,
            percent: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions;
    use crate::tools::{self, NewTool};

    #[test]
    fn complexity_is_weighted_sum() {
        let conn = store::open_in_memory().expect("db");
        register_capability(&conn, "search", "core", 3, &["store".to_string(), "index".to_string()])
            .expect("register");
        register_capability(&conn, "store", "core", 2, &[]).expect("register");
        tools::register(&conn, &NewTool::new("lint", "true")).expect("tool");
        sessions::start(&conn, "ana", None, None).expect("session");

        let report = complexity_score(&conn).expect("score");
        // 2*2 caps + (3+2) complexity + 3*2 deps + 1 tool + 1 session
        assert_eq!(report.score, 17);
        assert_eq!(report.level, ComplexityLevel::Low);
        assert_eq!(report.dependencies, 2);

        record_complexity(&conn).expect("record");
        assert_eq!(complexity_history(&conn, 1).expect("history").len(), 1);
    }

    #[test]
    fn duplicate_capability_returns_none_and_usage_counts() {
        let conn = store::open_in_memory().expect("db");
        assert!(register_capability(&conn, "sync", "io", 1, &[]).expect("register").is_some());
        assert_eq!(register_capability(&conn, "sync", "io", 5, &[]).expect("register"), None);
        assert!(use_capability(&conn, "sync").expect("use"));
        assert!(!use_capability(&conn, "ghost").expect("use"));
        assert_eq!(list_capabilities(&conn, Some("io")).expect("list")[0].usage_count, 1);
        assert_eq!(capability_map(&conn).expect("map")["sync"], Vec::<String>::new());
    }

    #[test]
    fn suggestions_flag_unused_capabilities() {
        let conn = store::open_in_memory().expect("db");
        register_capability(&conn, "legacy", "io", 1, &[]).expect("register");
        let suggestions = suggest_simplification(&conn).expect("suggest");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, "remove_unused");
        assert_eq!(suggestions[0].items, vec!["legacy"]);
    }

    #[test]
    fn utilization_keeps_latest_per_resource() {
        let conn = store::open_in_memory().expect("db");
        assert_eq!(record_utilization(&conn, "disk", 10.0, 0.0).expect("record"), 0.0);
        record_utilization(&conn, "disk", 25.0, 100.0).expect("record");
        record_utilization(&conn, "cpu", 1.0, 4.0).expect("record");
        let summary = utilization_summary(&conn).expect("summary");
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].resource, "disk");
        assert_eq!(summary[1].percent, 25.0);
    }
}
