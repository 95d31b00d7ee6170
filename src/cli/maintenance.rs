//! Maintenance tasks, capabilities, complexity and utilization

use anyhow::Result;
use clap::{Args, Subcommand};
use std::time::Duration;

use super::utils::{parse_csv, print_json};
use super::Workspace;
use crate::domain::{ExecutionStatus, TaskPriority};
use crate::maintenance::{self, capabilities, Schedule};
use crate::store;

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Schedule a shell command
    Add {
        name: String,
        command: String,
        /// hourly, daily, weekly, every_<N>_minutes or every_<N>_hours
        #[arg(long, default_value = "daily")]
        schedule: String,
        #[arg(long, default_value = "normal")]
        priority: TaskPriority,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List tasks by next run
    List {
        #[arg(long)]
        enabled_only: bool,
    },
    /// Run every task that is due
    Run,
    Enable { name: String },
    Disable { name: String },
}

#[derive(Subcommand)]
pub enum CapCommand {
    /// Register a capability
    Add {
        name: String,
        #[arg(long, default_value = "feature")]
        kind: String,
        #[arg(long, default_value_t = 1)]
        complexity: i64,
        /// Comma-separated capability names this one depends on
        #[arg(long)]
        depends_on: Option<String>,
    },
    /// Count a use of a capability
    Use { name: String },
    List {
        #[arg(long)]
        kind: Option<String>,
    },
    /// Dependencies of every capability as JSON
    Map,
}

#[derive(Args)]
pub struct ComplexityArgs {
    #[command(subcommand)]
    pub action: Option<ComplexityAction>,
}

#[derive(Subcommand)]
pub enum ComplexityAction {
    /// Compute the score without recording it
    Show,
    /// Compute the score and add it to the history
    Record,
    /// Recorded scores of the last DAYS
    History {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Ways to reduce complexity
    Suggest,
}

#[derive(Subcommand)]
pub enum UtilCommand {
    /// Record how much of a resource is used
    Record { resource: String, used: f64, total: f64 },
    /// Latest reading per resource
    Show,
}

pub fn run_task(cmd: TaskCommand, ws: &mut Workspace) -> Result<()> {
    let now = store::now();
    match cmd {
        TaskCommand::Add { name, command, schedule, priority, description } => {
            match maintenance::add_task(&ws.conn, &name, &schedule, &command, &description, priority, now)? {
                Some(id) => println!("✓ Task #{id} '{name}' scheduled {}", Schedule::parse(&schedule)),
                None => anyhow::bail!("Task '{}' already exists", name),
            }
        }
        TaskCommand::List { enabled_only } => {
            let tasks = maintenance::list_tasks(&ws.conn, enabled_only)?;
            if tasks.is_empty() {
                println!("No maintenance tasks.");
            }
            for t in tasks {
                let state = if t.enabled { "" } else { " (disabled)" };
                println!(
                    "{:<20} [{}] {:<18} next {} · {} runs{}",
                    t.name,
                    t.priority,
                    Schedule::parse(&t.schedule).to_string(),
                    t.next_run.as_deref().unwrap_or("-"),
                    t.run_count,
                    state
                );
            }
        }
        TaskCommand::Run => {
            let timeout = Duration::from_secs(ws.config.task_timeout_secs);
            let runs = maintenance::run_due_tasks(&mut ws.conn, now, timeout)?;
            if runs.is_empty() {
                println!("No tasks due.");
                return Ok(());
            }
            let failed = runs.iter().filter(|r| r.status != ExecutionStatus::Success).count();
            for r in &runs {
                let mark = if r.status == ExecutionStatus::Success { "✓" } else { "✗" };
                println!("{mark} {} ({}, {:.2}s)", r.task, r.status, r.duration);
                if !r.error.is_empty() {
                    println!("    {}", r.error.trim());
                }
            }
            println!("\n{} tasks run, {} failed", runs.len(), failed);
        }
        TaskCommand::Enable { name } => {
            if !maintenance::set_enabled(&ws.conn, &name, true)? {
                anyhow::bail!("Task '{}' not found", name);
            }
            println!("✓ {name} enabled");
        }
        TaskCommand::Disable { name } => {
            if !maintenance::set_enabled(&ws.conn, &name, false)? {
                anyhow::bail!("Task '{}' not found", name);
            }
            println!("✓ {name} disabled");
        }
    }
    Ok(())
}

pub fn run_cap(cmd: CapCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        CapCommand::Add { name, kind, complexity, depends_on } => {
            match capabilities::register_capability(conn, &name, &kind, complexity, &parse_csv(&depends_on))? {
                Some(id) => println!("✓ Capability #{id} '{name}' registered"),
                None => anyhow::bail!("Capability '{}' already exists", name),
            }
        }
        CapCommand::Use { name } => {
            if !capabilities::use_capability(conn, &name)? {
                anyhow::bail!("Capability '{}' not found", name);
            }
            println!("✓ {name} used");
        }
        CapCommand::List { kind } => {
            for c in capabilities::list_capabilities(conn, kind.as_deref())? {
                println!(
                    "{:<24} [{}] complexity {} · {} deps · used {}×",
                    c.name,
                    c.kind,
                    c.complexity,
                    c.dependencies.len(),
                    c.usage_count
                );
            }
        }
        CapCommand::Map => print_json(&capabilities::capability_map(conn)?)?,
    }
    Ok(())
}

pub fn run_complexity(args: ComplexityArgs, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match args.action.unwrap_or(ComplexityAction::Show) {
        action @ (ComplexityAction::Show | ComplexityAction::Record) => {
            let report = if matches!(action, ComplexityAction::Record) {
                capabilities::record_complexity(conn)?
            } else {
                capabilities::complexity_score(conn)?
            };
            println!("Complexity: {} ({})", report.score, report.level.as_str().to_uppercase());
            println!("  Capabilities:    {} (total complexity {})", report.capabilities, report.total_complexity);
            println!("  Dependencies:    {}", report.dependencies);
            println!("  Active tools:    {}", report.tools);
            println!("  Active sessions: {}", report.active_sessions);
        }
        ComplexityAction::History { days } => {
            let history = capabilities::complexity_history(conn, days)?;
            if history.is_empty() {
                println!("No complexity recorded in the last {days} days.");
            }
            for (at, score) in history {
                println!("{at}  {score}");
            }
        }
        ComplexityAction::Suggest => {
            let suggestions = capabilities::suggest_simplification(conn)?;
            if suggestions.is_empty() {
                println!("✓ Nothing to simplify");
            }
            for s in suggestions {
                println!("[{} impact] {}", s.impact, s.message);
                for item in &s.items {
                    println!("    - {item}");
                }
            }
        }
    }
    Ok(())
}

pub fn run_util(cmd: UtilCommand, ws: &Workspace) -> Result<()> {
    match cmd {
        UtilCommand::Record { resource, used, total } => {
            let percent = capabilities::record_utilization(&ws.conn, &resource, used, total)?;
            println!("✓ {resource}: {percent:.1}%");
        }
        UtilCommand::Show => {
            let summary = capabilities::utilization_summary(&ws.conn)?;
            if summary.is_empty() {
                println!("No utilization recorded.");
            }
            for u in summary {
                println!("{:<16} {:>6.1}% ({} / {}) at {}", u.resource, u.percent, u.used, u.total, u.created_at);
            }
        }
    }
    Ok(())
}
