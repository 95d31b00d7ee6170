//! Tool registry: registration, timed execution with usage statistics,
//! improvement proposals, health checks and admin actions.

use crate::domain::{ExecutionStatus, ToolStatus};
use crate::error::{Result, WsError};
use crate::process;
use crate::store::{self, insert_unique, truncate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

const RESULT_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tool {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub command: String,
    pub category: String,
    pub version: String,
    pub status: ToolStatus,
    pub usage_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_runtime: f64,
    pub last_used: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Tool {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: row.get("kind")?,
            description: row.get("description")?,
            command: row.get("command")?,
            category: row.get("category")?,
            version: row.get("version")?,
            status: row.get("status")?,
            usage_count: row.get("usage_count")?,
            success_count: row.get("success_count")?,
            failure_count: row.get("failure_count")?,
            avg_runtime: row.get("avg_runtime")?,
            last_used: row.get("last_used")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Percentage of successful runs, 0 when never used.
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.usage_count as f64 * 1000.0).round() / 10.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTool {
    pub name: String,
    pub kind: String,
    pub command: String,
    pub description: String,
    pub category: String,
    pub version: String,
}

impl NewTool {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "script".to_string(),
            command: command.to_string(),
            description: String::new(),
            category: "general".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Result of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolRun {
    pub status: ExecutionStatus,
    pub output: String,
    pub error: Option<String>,
    pub runtime: f64,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

pub fn register(conn: &Connection, tool: &NewTool) -> Result<Option<i64>> {
    let now = store::now_ts();
    let id = insert_unique(
        conn,
        "INSERT INTO tools(name, kind, description, command, category, version, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![tool.name, tool.kind, tool.description, tool.command, tool.category, tool.version, now],
    )?;
    if let Some(id) = id {
        tracing::debug!(id, table = "tools", name = %tool.name, "tool registered");
    }
    Ok(id)
}

pub fn get(conn: &Connection, name: &str) -> Result<Option<Tool>> {
    Ok(conn.query_row("SELECT * FROM tools WHERE name = ?1", [name], Tool::from_row).optional()?)
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Tool>> {
    Ok(conn.query_row("SELECT * FROM tools WHERE id = ?1", [id], Tool::from_row).optional()?)
}

/// Tools with `status` (all statuses when `None`), most used first.
pub fn list(
    conn: &Connection,
    category: Option<&str>,
    status: Option<ToolStatus>,
) -> Result<Vec<Tool>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tools WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR status = ?2)
         ORDER BY usage_count DESC, name",
    )?;
    let rows = stmt.query_map(params![category, status], Tool::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Run a registered tool, log the execution and update its statistics.
///
/// Returns `None` when no tool has that name.
pub fn execute(
    conn: &mut Connection,
    name: &str,
    args: Option<&str>,
    user: &str,
    timeout: Duration,
) -> Result<Option<ToolRun>> {
    let Some(tool) = get(conn, name)? else {
        return Ok(None);
    };
    if tool.status == ToolStatus::Disabled {
        return Err(WsError::InvalidValue {
            field: "tool",
            value: format!("{name} is disabled"),
        });
    }

    let command = match args.filter(|a| !a.trim().is_empty()) {
        Some(args) => format!("{} {}", tool.command, args),
        None => tool.command.clone(),
    };
    let outcome = process::run_shell(&command, timeout);
    let run = ToolRun {
        status: outcome.status,
        output: if outcome.success() { outcome.stdout.clone() } else { outcome.stderr.clone() },
        error: match outcome.status {
            ExecutionStatus::Success => None,
            ExecutionStatus::Timeout => Some("Timeout".to_string()),
            _ => Some(outcome.stderr.clone()),
        },
        runtime: outcome.duration.as_secs_f64(),
    };

    let tx = conn.transaction()?;
    let now = store::now_ts();
    tx.execute(
        "INSERT INTO tool_executions(tool_id, args, username, status, runtime, result, error, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            tool.id,
            args.unwrap_or(""),
            user,
            run.status,
            run.runtime,
            truncate(&run.output, RESULT_LIMIT),
            run.error.as_deref().map(|e| truncate(e, RESULT_LIMIT)),
            now
        ],
    )?;
    let success = i64::from(run.success());
    tx.execute(
        "UPDATE tools SET
            avg_runtime = (avg_runtime * usage_count + ?1) / (usage_count + 1),
            usage_count = usage_count + 1,
            success_count = success_count + ?2,
            failure_count = failure_count + (1 - ?2),
            last_used = ?3,
            updated_at = ?3
         WHERE id = ?4",
        params![run.runtime, success, now, tool.id],
    )?;
    tx.commit()?;

    tracing::debug!(tool = %name, status = %run.status, runtime = run.runtime, "tool executed");
    Ok(Some(run))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStats {
    pub name: String,
    pub usage_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub success_rate: f64,
    pub avg_runtime: f64,
}

pub fn stats(conn: &Connection, name: &str) -> Result<Option<ToolStats>> {
    Ok(get(conn, name)?.map(|tool| ToolStats {
        success_rate: tool.success_rate(),
        avg_runtime: (tool.avg_runtime * 1000.0).round() / 1000.0,
        name: tool.name,
        usage_count: tool.usage_count,
        success_count: tool.success_count,
        failure_count: tool.failure_count,
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSummary {
    pub status_counts: BTreeMap<String, i64>,
    /// Mean success rate over tools that have been used; `None` when none have.
    pub avg_success_rate: Option<f64>,
}

pub fn health_summary(conn: &Connection) -> Result<HealthSummary> {
    let mut summary = HealthSummary::default();
    {
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tools GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            summary.status_counts.insert(status, count);
        }
    }
    summary.avg_success_rate = conn.query_row(
        "SELECT AVG(CAST(success_count AS REAL) / usage_count * 100) FROM tools WHERE usage_count > 0",
        [],
        |row| row.get(0),
    )?;
    Ok(summary)
}

/// Register every `*.py` and `*.sh` script in `dir` that is not yet known.
pub fn discover(conn: &Connection, dir: &Path) -> Result<Vec<String>> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    entries.sort();

    let mut discovered = Vec::new();
    for path in entries.iter().filter(|p| p.is_file()) {
        let (kind, runner) = match path.extension().and_then(|e| e.to_str()) {
            Some("py") => ("python", "python3"),
            Some("sh") => ("shell", "bash"),
            _ => continue,
        };
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let tool = NewTool {
            name: name.to_string(),
            kind: kind.to_string(),
            command: format!("{runner} {}", path.display()),
            description: format!("Auto-discovered: {name}"),
            category: "auto-discovered".to_string(),
            version: "1.0".to_string(),
        };
        if register(conn, &tool)?.is_some() {
            discovered.push(name.to_string());
        }
    }
    Ok(discovered)
}

// === Improvements ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Improvement {
    pub id: i64,
    pub tool_id: i64,
    pub tool_name: Option<String>,
    pub kind: String,
    pub description: String,
    pub impact: String,
    pub status: String,
    pub created_at: String,
    pub implemented_at: Option<String>,
}

pub fn propose_improvement(
    conn: &Connection,
    tool_id: i64,
    kind: &str,
    description: &str,
    impact: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO tool_improvements(tool_id, kind, description, impact, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![tool_id, kind, description, impact, store::now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_improvements(conn: &Connection, status: Option<&str>) -> Result<Vec<Improvement>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.tool_id, t.name, i.kind, i.description, i.impact, i.status,
                i.created_at, i.implemented_at
         FROM tool_improvements i LEFT JOIN tools t ON i.tool_id = t.id
         WHERE ?1 IS NULL OR i.status = ?1
         ORDER BY i.status, i.created_at DESC, i.id DESC",
    )?;
    let rows = stmt.query_map([status], |row| {
        Ok(Improvement {
            id: row.get(0)?,
            tool_id: row.get(1)?,
            tool_name: row.get(2)?,
            kind: row.get(3)?,
            description: row.get(4)?,
            impact: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            implemented_at: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn implement_improvement(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE tool_improvements SET status = 'implemented', implemented_at = ?1 WHERE id = ?2",
        params![store::now_ts(), id],
    )?;
    Ok(changed > 0)
}

// === Component health checks ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: String,
    pub message: String,
    pub created_at: String,
}

/// Run a tool as a health check for `component` and record the result.
pub fn check_component(
    conn: &mut Connection,
    component: &str,
    tool_name: &str,
    user: &str,
    timeout: Duration,
) -> Result<ComponentHealth> {
    let (status, message) = match execute(conn, tool_name, None, user, timeout) {
        Ok(Some(run)) if run.success() => ("healthy", truncate(run.output.trim(), 200)),
        Ok(Some(run)) => ("unhealthy", run.error.unwrap_or_default()),
        Ok(None) => ("error", format!("tool '{tool_name}' is not registered")),
        Err(e) => ("error", e.to_string()),
    };
    let now = store::now_ts();
    conn.execute(
        "INSERT INTO health_checks(component, status, message, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![component, status, message, now],
    )?;
    Ok(ComponentHealth {
        component: component.to_string(),
        status: status.to_string(),
        message,
        created_at: now,
    })
}

/// Latest check per component and the overall verdict:
/// healthy (all), degraded (some) or unhealthy (none).
pub fn component_status(conn: &Connection) -> Result<(String, Vec<ComponentHealth>)> {
    let mut stmt = conn.prepare(
        "SELECT component, status, message, created_at FROM health_checks
         WHERE id IN (SELECT MAX(id) FROM health_checks WHERE component != ?1 GROUP BY component)
         ORDER BY component",
    )?;
    let components = stmt
        .query_map([crate::health::SYSTEM_COMPONENT], |row| {
            Ok(ComponentHealth {
                component: row.get(0)?,
                status: row.get(1)?,
                message: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let healthy = components.iter().filter(|c| c.status == "healthy").count();
    let overall = if healthy == components.len() {
        "healthy"
    } else if healthy > 0 {
        "degraded"
    } else {
        "unhealthy"
    };
    Ok((overall.to_string(), components))
}

// === Admin actions ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminLogEntry {
    pub admin: String,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub details: String,
    pub created_at: String,
}

fn log_admin(
    conn: &Connection,
    admin: &str,
    action: &str,
    tool_id: i64,
    details: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO admin_log(admin, action, target_type, target_id, details, created_at)
         VALUES(?1, ?2, 'tool', ?3, ?4, ?5)",
        params![admin, action, tool_id, details, store::now_ts()],
    )?;
    Ok(())
}

/// Enable or disable a tool and record who did it.
pub fn set_status(
    conn: &mut Connection,
    admin: &str,
    tool_id: i64,
    status: ToolStatus,
    reason: &str,
) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE tools SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, store::now_ts(), tool_id],
    )?;
    if changed == 0 {
        return Err(WsError::not_found("tool", tool_id));
    }
    let action = match status {
        ToolStatus::Active => "enable_tool",
        ToolStatus::Disabled => "disable_tool",
    };
    log_admin(&tx, admin, action, tool_id, reason)?;
    tx.commit()?;
    Ok(())
}

pub fn reset_stats(conn: &mut Connection, admin: &str, tool_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE tools SET usage_count = 0, success_count = 0, failure_count = 0, avg_runtime = 0
         WHERE id = ?1",
        [tool_id],
    )?;
    if changed == 0 {
        return Err(WsError::not_found("tool", tool_id));
    }
    log_admin(&tx, admin, "reset_stats", tool_id, "")?;
    tx.commit()?;
    Ok(())
}

pub fn admin_log(conn: &Connection, limit: usize) -> Result<Vec<AdminLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT admin, action, target_type, target_id, details, created_at FROM admin_log
         ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok(AdminLogEntry {
            admin: row.get(0)?,
            action: row.get(1)?,
            target_type: row.get(2)?,
            target_id: row.get(3)?,
            details: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete execution logs older than `days`.
pub fn cleanup_executions(conn: &Connection, days: i64) -> Result<usize> {
    let cutoff = store::format_ts(store::now() - chrono::Duration::days(days));
    Ok(conn.execute("DELETE FROM tool_executions WHERE created_at < ?1", [cutoff])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn register_then_get_round_trips() {
        let conn = store::open_in_memory().expect("db");
        let mut new = NewTool::new("lint", "echo lint");
        new.category = "quality".to_string();
        register(&conn, &new).expect("register").expect("id");
        let tool = get(&conn, "lint").expect("get").expect("exists");
        assert_eq!(tool.command, "echo lint");
        assert_eq!(tool.category, "quality");
        assert_eq!(tool.status, ToolStatus::Active);
        assert_eq!(tool.usage_count, 0);
    }

    #[test]
    fn duplicate_tool_name_returns_none() {
        let conn = store::open_in_memory().expect("db");
        assert!(register(&conn, &NewTool::new("fmt", "true")).expect("register").is_some());
        assert_eq!(register(&conn, &NewTool::new("fmt", "false")).expect("register"), None);
    }

    #[test]
    fn execution_updates_counters() {
        let mut conn = store::open_in_memory().expect("db");
        register(&conn, &NewTool::new("greet", "echo")).expect("register");
        register(&conn, &NewTool::new("broken", "exit 2")).expect("register");

        let run = execute(&mut conn, "greet", Some("hi"), "tester", TIMEOUT)
            .expect("execute")
            .expect("tool exists");
        assert!(run.success());
        assert_eq!(run.output.trim(), "hi");

        let run = execute(&mut conn, "broken", None, "tester", TIMEOUT)
            .expect("execute")
            .expect("tool exists");
        assert_eq!(run.status, ExecutionStatus::Failed);

        let greet = stats(&conn, "greet").expect("stats").expect("exists");
        assert_eq!(greet.usage_count, 1);
        assert_eq!(greet.success_rate, 100.0);
        let broken = stats(&conn, "broken").expect("stats").expect("exists");
        assert_eq!(broken.failure_count, 1);
        assert_eq!(broken.success_rate, 0.0);

        let logged: i64 = conn
            .query_row("SELECT COUNT(*) FROM tool_executions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(logged, 2);
        assert!(execute(&mut conn, "missing", None, "tester", TIMEOUT).expect("execute").is_none());
    }

    #[test]
    fn disabled_tool_refuses_to_run_and_is_logged() {
        let mut conn = store::open_in_memory().expect("db");
        let id = register(&conn, &NewTool::new("deploy", "true")).expect("register").expect("id");
        set_status(&mut conn, "root", id, ToolStatus::Disabled, "flaky").expect("disable");

        assert!(execute(&mut conn, "deploy", None, "u", TIMEOUT).is_err());
        let log = admin_log(&conn, 10).expect("log");
        assert_eq!(log[0].action, "disable_tool");
        assert_eq!(log[0].details, "flaky");

        set_status(&mut conn, "root", id, ToolStatus::Active, "").expect("enable");
        reset_stats(&mut conn, "root", id).expect("reset");
        assert_eq!(admin_log(&conn, 10).expect("log").len(), 3);
        assert!(set_status(&mut conn, "root", 999, ToolStatus::Active, "").is_err());
    }

    #[test]
    fn improvements_lifecycle() {
        let conn = store::open_in_memory().expect("db");
        let id = register(&conn, &NewTool::new("scan", "true")).expect("register").expect("id");
        let imp = propose_improvement(&conn, id, "performance", "Cache results", "high").expect("propose");
        assert!(implement_improvement(&conn, imp).expect("implement"));
        let listed = list_improvements(&conn, Some("implemented")).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tool_name.as_deref(), Some("scan"));
        assert!(listed[0].implemented_at.is_some());
    }

    #[test]
    fn discover_registers_scripts_once() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("sync.sh"), "echo sync").expect("write");
        fs::write(tmp.path().join("report.py"), "print(1)").expect("write");
        fs::write(tmp.path().join("notes.txt"), "").expect("write");

        let conn = store::open_in_memory().expect("db");
        let found = discover(&conn, tmp.path()).expect("discover");
        assert_eq!(found, vec!["report", "sync"]);
        assert!(discover(&conn, tmp.path()).expect("discover").is_empty());
        assert_eq!(get(&conn, "sync").expect("get").expect("exists").kind, "shell");
    }

    #[test]
    fn component_status_reports_degraded() {
        let mut conn = store::open_in_memory().expect("db");
        register(&conn, &NewTool::new("ok", "echo fine")).expect("register");
        register(&conn, &NewTool::new("bad", "exit 1")).expect("register");
        check_component(&mut conn, "db", "ok", "u", TIMEOUT).expect("check");
        check_component(&mut conn, "git", "bad", "u", TIMEOUT).expect("check");

        let (overall, components) = component_status(&conn).expect("status");
        assert_eq!(overall, "degraded");
        assert_eq!(components.len(), 2);
    }
}
