//! Whole-workspace health check.

use crate::domain::{Grade, HealthStatus, ToolStatus};
use crate::error::Result;
use crate::quality;
use crate::store::{self, json_column};
use chrono::Duration;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `health_checks.component` value used for whole-workspace checks.
pub const SYSTEM_COMPONENT: &str = "system";

const MAX_DB_BYTES: u64 = 10 * 1024 * 1024;
const MIN_ACTIVE_TOOLS: i64 = 5;
const MAX_UNRESOLVED_ALERTS: i64 = 5;
const CRITICAL_ISSUES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthData {
    pub db_size: u64,
    pub tools_active: i64,
    pub quality_grade: Option<char>,
    pub alerts: i64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(flatten)]
    pub data: HealthData,
    pub checked_at: String,
}

impl HealthReport {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            status: row.get("status")?,
            data: json_column(row, "data")?,
            checked_at: row.get("created_at")?,
        })
    }
}

pub fn status_for(issue_count: usize) -> HealthStatus {
    match issue_count {
        0 => HealthStatus::Healthy,
        n if n >= CRITICAL_ISSUES => HealthStatus::Critical,
        _ => HealthStatus::Warning,
    }
}

fn issues_for(db_size: u64, tools_active: i64, grade: Option<Grade>, alerts: i64) -> Vec<String> {
    let mut issues = Vec::new();
    if db_size > MAX_DB_BYTES {
        issues.push("Database too large".to_string());
    }
    if tools_active < MIN_ACTIVE_TOOLS {
        issues.push("Few tools active".to_string());
    }
    if grade.is_some_and(Grade::is_poor) {
        issues.push("Low quality grade".to_string());
    }
    if alerts > MAX_UNRESOLVED_ALERTS {
        issues.push("Many unresolved alerts".to_string());
    }
    issues
}

/// Measure the workspace, record the result and return it.
pub fn check_health(conn: &Connection, db_path: &Path) -> Result<HealthReport> {
    let db_size = fs::metadata(db_path)?.len();
    let tools_active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tools WHERE status = ?1",
        [ToolStatus::Active],
        |row| row.get(0),
    )?;
    let grade: Option<Grade> = conn
        .query_row("SELECT grade FROM assessments ORDER BY created_at DESC, id DESC LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    let alerts = quality::unresolved_alert_count(conn)?;

    let issues = issues_for(db_size, tools_active, grade, alerts);
    let status = status_for(issues.len());
    let data = HealthData { db_size, tools_active, quality_grade: grade.map(Grade::letter), alerts, issues };

    let checked_at = store::now_ts();
    conn.execute(
        "INSERT INTO health_checks(component, status, message, data, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![SYSTEM_COMPONENT, status, data.issues.join("; "), serde_json::to_string(&data)?, checked_at],
    )?;
    tracing::debug!(status = %status, issues = data.issues.len(), "health check recorded");
    Ok(HealthReport { status, data, checked_at })
}

/// Recorded workspace checks from the last `hours`, newest first.
pub fn health_history(conn: &Connection, hours: i64) -> Result<Vec<HealthReport>> {
    let cutoff = store::format_ts(store::now() - Duration::hours(hours));
    let mut stmt = conn.prepare(
        "SELECT status, data, created_at FROM health_checks
         WHERE component = ?1 AND created_at > ?2 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![SYSTEM_COMPONENT, cutoff], HealthReport::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{self, NewTool};
    use tempfile::TempDir;

    #[test]
    fn status_bands() {
        assert_eq!(status_for(0), HealthStatus::Healthy);
        assert_eq!(status_for(2), HealthStatus::Warning);
        assert_eq!(status_for(3), HealthStatus::Critical);
    }

    #[test]
    fn issue_rules() {
        assert!(issues_for(0, 5, Some(Grade::B), 5).is_empty());
        assert_eq!(
            issues_for(MAX_DB_BYTES + 1, 4, Some(Grade::F), 6),
            vec!["Database too large", "Few tools active", "Low quality grade", "Many unresolved alerts"]
        );
        assert_eq!(issues_for(0, 5, None, 0), Vec::<String>::new());
    }

    #[test]
    fn check_is_recorded_and_listed() {
        let tmp = TempDir::new().expect("tmp");
        let db_path = tmp.path().join("ws.db");
        let conn = store::open(&db_path).expect("db");
        for name in ["a", "b", "c", "d", "e"] {
            tools::register(&conn, &NewTool::new(name, "true")).expect("tool");
        }

        let report = check_health(&conn, &db_path).expect("health");
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.data.tools_active, 5);
        assert!(report.data.db_size > 0);

        quality::run_assessment(&conn, "system", "workspace").expect("assessment");
        let history = health_history(&conn, 24).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], report);

        let (overall, components) = tools::component_status(&conn).expect("components");
        assert_eq!(overall, "healthy");
        assert!(components.is_empty(), "system checks are not tool components");
    }
}
