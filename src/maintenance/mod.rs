//! Scheduled maintenance tasks, plus capability, complexity and utilization
//! tracking.

pub mod capabilities;
pub mod scheduler;

pub use capabilities::{
    capability_map, complexity_history, complexity_score, list_capabilities, record_complexity,
    record_utilization, register_capability, suggest_simplification, use_capability,
    utilization_summary, Capability, ComplexityReport, Suggestion, Utilization,
};
pub use scheduler::Schedule;

use crate::domain::{ExecutionStatus, TaskPriority};
use crate::error::Result;
use crate::process;
use crate::store::{self, insert_unique, truncate};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::time::Duration;

const OUTPUT_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub schedule: String,
    pub command: String,
    pub priority: TaskPriority,
    pub enabled: bool,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub run_count: i64,
    pub avg_duration: f64,
    pub created_at: String,
}

impl Task {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            schedule: row.get("schedule")?,
            command: row.get("command")?,
            priority: row.get("priority")?,
            enabled: row.get("enabled")?,
            last_run: row.get("last_run")?,
            next_run: row.get("next_run")?,
            run_count: row.get("run_count")?,
            avg_duration: row.get("avg_duration")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Outcome of one task run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRun {
    pub task: String,
    pub status: ExecutionStatus,
    pub duration: f64,
    pub output: String,
    pub error: String,
}

/// Register a task, first due one interval after `now`. `None` when the name is taken.
///
/// Unlike stored rows, a new task's schedule must be well formed.
pub fn add_task(
    conn: &Connection,
    name: &str,
    schedule: &str,
    command: &str,
    description: &str,
    priority: TaskPriority,
    now: NaiveDateTime,
) -> Result<Option<i64>> {
    let next_run = schedule.parse::<Schedule>()?.next_run(now);
    insert_unique(
        conn,
        "INSERT INTO maintenance_tasks(name, description, schedule, command, priority, next_run, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            name,
            description,
            schedule,
            command,
            priority,
            store::format_ts(next_run),
            store::format_ts(now)
        ],
    )
}

pub fn list_tasks(conn: &Connection, enabled_only: bool) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM maintenance_tasks WHERE (?1 = 0 OR enabled = 1) ORDER BY next_run, name",
    )?;
    let rows = stmt.query_map([enabled_only], Task::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn set_enabled(conn: &Connection, name: &str, enabled: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE maintenance_tasks SET enabled = ?1 WHERE name = ?2",
        params![enabled, name],
    )?;
    Ok(changed > 0)
}

/// Enabled tasks whose next run is at or before `now`, highest priority first.
pub fn due_tasks(conn: &Connection, now: NaiveDateTime) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM maintenance_tasks WHERE enabled = 1 AND next_run <= ?1
         ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END, next_run, id",
    )?;
    let rows = stmt.query_map([store::format_ts(now)], Task::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Run every due task in turn and reschedule it from `now`.
///
/// Failures are recorded, not retried.
pub fn run_due_tasks(conn: &mut Connection, now: NaiveDateTime, timeout: Duration) -> Result<Vec<TaskRun>> {
    let due = due_tasks(conn, now)?;
    let mut runs = Vec::with_capacity(due.len());

    for task in due {
        tracing::debug!(task = %task.name, command = %task.command, "running maintenance task");
        let outcome = process::run_shell(&task.command, timeout);
        let error = match outcome.status {
            ExecutionStatus::Success => String::new(),
            ExecutionStatus::Timeout => format!("Task timed out after {} seconds", timeout.as_secs()),
            _ => truncate(&outcome.stderr, OUTPUT_LIMIT),
        };
        let run = TaskRun {
            task: task.name.clone(),
            status: outcome.status,
            duration: outcome.duration.as_secs_f64(),
            output: truncate(&outcome.stdout, OUTPUT_LIMIT),
            error,
        };

        let run_count = task.run_count + 1;
        let avg_duration = (task.avg_duration * task.run_count as f64 + run.duration) / run_count as f64;
        let next_run = Schedule::parse(&task.schedule).next_run(now);

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO task_executions(task_id, status, duration, output, error, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![task.id, run.status, run.duration, run.output, run.error, store::now_ts()],
        )?;
        tx.execute(
            "UPDATE maintenance_tasks SET last_run = ?1, next_run = ?2, run_count = ?3, avg_duration = ?4
             WHERE id = ?5",
            params![store::format_ts(now), store::format_ts(next_run), run_count, avg_duration, task.id],
        )?;
        tx.commit()?;

        if run.status != ExecutionStatus::Success {
            tracing::warn!(task = %run.task, status = %run.status, error = %run.error, "maintenance task did not succeed");
        }
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WsError;
    use chrono::Duration as ChronoDuration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn new_task_is_not_due_until_its_interval_passes() {
        let conn = store::open_in_memory().expect("db");
        let now = store::now();
        add_task(&conn, "vacuum", "daily", "true", "", TaskPriority::Normal, now)
            .expect("add")
            .expect("id");
        assert!(due_tasks(&conn, now).expect("due").is_empty());
        assert_eq!(due_tasks(&conn, now + ChronoDuration::days(1)).expect("due").len(), 1);
        assert_eq!(
            add_task(&conn, "vacuum", "hourly", "true", "", TaskPriority::Low, now).expect("add"),
            None
        );
    }

    #[test]
    fn malformed_schedule_is_refused_on_add() {
        let conn = store::open_in_memory().expect("db");
        let now = store::now();
        for schedule in ["every_4294967295_hours", "fortnightly"] {
            let err = add_task(&conn, "huge", schedule, "true", "", TaskPriority::Normal, now)
                .expect_err("must refuse");
            assert!(matches!(err, WsError::InvalidValue { field: "schedule", .. }), "{schedule}");
        }
        assert!(list_tasks(&conn, false).expect("list").is_empty());
    }

    #[test]
    fn run_due_tasks_orders_by_priority_and_reschedules() {
        let mut conn = store::open_in_memory().expect("db");
        let start = store::now();
        add_task(&conn, "low", "hourly", "echo low", "", TaskPriority::Low, start).expect("add");
        add_task(&conn, "high", "hourly", "echo high", "", TaskPriority::High, start).expect("add");
        add_task(&conn, "broken", "hourly", "echo bad >&2; exit 4", "", TaskPriority::Normal, start)
            .expect("add");

        let later = start + ChronoDuration::hours(2);
        let runs = run_due_tasks(&mut conn, later, TIMEOUT).expect("run");
        let order: Vec<_> = runs.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(order, vec!["high", "broken", "low"]);
        assert_eq!(runs[0].output.trim(), "high");
        assert_eq!(runs[1].status, ExecutionStatus::Failed);
        assert_eq!(runs[1].error.trim(), "bad");

        let tasks = list_tasks(&conn, true).expect("list");
        assert!(tasks.iter().all(|t| t.run_count == 1));
        let expected_next = store::format_ts(later + ChronoDuration::hours(1));
        assert!(tasks.iter().all(|t| t.next_run.as_deref() == Some(expected_next.as_str())));
        assert!(run_due_tasks(&mut conn, later, TIMEOUT).expect("run again").is_empty());

        let logged: i64 = conn
            .query_row("SELECT COUNT(*) FROM task_executions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(logged, 3);
    }

    #[test]
    fn slow_task_times_out() {
        let mut conn = store::open_in_memory().expect("db");
        let start = store::now();
        add_task(&conn, "slow", "every_5_minutes", "sleep 5", "", TaskPriority::Normal, start)
            .expect("add");
        let runs = run_due_tasks(&mut conn, start + ChronoDuration::minutes(10), Duration::from_millis(200))
            .expect("run");
        assert_eq!(runs[0].status, ExecutionStatus::Timeout);
        assert!(runs[0].error.starts_with("Task timed out"));
    }

    #[test]
    fn disabled_tasks_are_skipped() {
        let mut conn = store::open_in_memory().expect("db");
        let start = store::now();
        add_task(&conn, "off", "hourly", "true", "", TaskPriority::Normal, start).expect("add");
        assert!(set_enabled(&conn, "off", false).expect("disable"));
        assert!(run_due_tasks(&mut conn, start + ChronoDuration::days(1), TIMEOUT).expect("run").is_empty());
        assert!(list_tasks(&conn, true).expect("list").is_empty());
        assert_eq!(list_tasks(&conn, false).expect("list").len(), 1);
    }
}
