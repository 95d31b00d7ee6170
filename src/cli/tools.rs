//! Tool registry commands

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

use super::Workspace;
use crate::domain::ToolStatus;
use crate::tools::{self, NewTool, Tool};

#[derive(Subcommand)]
pub enum ToolCommand {
    /// Register a command as a tool
    #[command(disable_version_flag = true)]
    Register {
        name: String,
        command: String,
        #[arg(long, default_value = "script")]
        kind: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(long, default_value = "general")]
        category: String,
        #[arg(long, default_value = "1.0")]
        version: String,
    },
    /// List tools, most used first
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<ToolStatus>,
    },
    /// Run a tool and record the execution
    Exec {
        name: String,
        /// Extra arguments appended to the tool command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Usage statistics of a tool
    Stats { name: String },
    /// Tool counts by status and mean success rate
    Health,
    /// Register the .py and .sh scripts in a directory
    Discover {
        #[arg(default_value = "tools")]
        dir: PathBuf,
    },
    /// Suggested tool improvements
    #[command(subcommand)]
    Improve(ImproveCommand),
    /// Enable, disable or reset tools (logged)
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Run a tool as the health check of a component
    CheckComponent {
        component: String,
        tool: String,
    },
    /// Latest health of every checked component
    Components,
    /// Delete execution logs older than DAYS
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Subcommand)]
pub enum ImproveCommand {
    /// Suggest an improvement to a tool
    Propose {
        tool: String,
        description: String,
        #[arg(long, default_value = "enhancement")]
        kind: String,
        #[arg(long, default_value = "medium")]
        impact: String,
    },
    /// List improvements
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark an improvement implemented
    Implement { id: i64 },
}

#[derive(Subcommand)]
pub enum AdminCommand {
    Enable {
        tool: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    Disable {
        tool: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Zero the usage counters of a tool
    Reset { tool: String },
    /// Recent admin actions
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn require(ws: &Workspace, name: &str) -> Result<Tool> {
    match tools::get(&ws.conn, name)? {
        Some(tool) => Ok(tool),
        None => anyhow::bail!("Tool '{}' not found", name),
    }
}

pub fn run(cmd: ToolCommand, ws: &mut Workspace) -> Result<()> {
    let timeout = Duration::from_secs(ws.config.tool_timeout_secs);
    match cmd {
        ToolCommand::Register { name, command, kind, description, category, version } => {
            let tool = NewTool { kind, description, category, version, ..NewTool::new(&name, &command) };
            match tools::register(&ws.conn, &tool)? {
                Some(id) => println!("✓ Tool #{id} '{name}' registered"),
                None => anyhow::bail!("Tool '{}' already registered", name),
            }
        }
        ToolCommand::List { category, status } => {
            let list = tools::list(&ws.conn, category.as_deref(), status)?;
            if list.is_empty() {
                println!("No tools.");
            }
            for t in list {
                println!(
                    "{:<20} [{}] {:<10} used {:>4}× ({:.1}% ok)",
                    t.name,
                    t.status,
                    t.category,
                    t.usage_count,
                    t.success_rate()
                );
            }
        }
        ToolCommand::Exec { name, args, user } => {
            let user = user.unwrap_or_else(|| ws.config.default_user.clone());
            let args = (!args.is_empty()).then(|| args.join(" "));
            let Some(run) = tools::execute(&mut ws.conn, &name, args.as_deref(), &user, timeout)? else {
                anyhow::bail!("Tool '{}' not found", name);
            };
            print!("{}", run.output);
            if !run.success() {
                anyhow::bail!(
                    "Tool '{}' {} after {:.2}s: {}",
                    name,
                    run.status,
                    run.runtime,
                    run.error.unwrap_or_default().trim()
                );
            }
            tracing::info!(tool = %name, runtime = run.runtime, "tool finished");
        }
        ToolCommand::Stats { name } => {
            let Some(stats) = tools::stats(&ws.conn, &name)? else {
                anyhow::bail!("Tool '{}' not found", name);
            };
            println!("Tool:         {}", stats.name);
            println!("Runs:         {}", stats.usage_count);
            println!("Succeeded:    {}", stats.success_count);
            println!("Failed:       {}", stats.failure_count);
            println!("Success rate: {:.1}%", stats.success_rate);
            println!("Avg runtime:  {:.3}s", stats.avg_runtime);
        }
        ToolCommand::Health => {
            let summary = tools::health_summary(&ws.conn)?;
            for (status, count) in &summary.status_counts {
                println!("{status:<10} {count}");
            }
            match summary.avg_success_rate {
                Some(rate) => println!("Mean success rate: {rate:.1}%"),
                None => println!("Mean success rate: no runs yet"),
            }
        }
        ToolCommand::Discover { dir } => {
            if !dir.is_dir() {
                anyhow::bail!("{} is not a directory", dir.display());
            }
            let found = tools::discover(&ws.conn, &dir)?;
            for name in &found {
                println!("✓ {name}");
            }
            println!("Discovered {} new tools", found.len());
        }
        ToolCommand::Improve(ImproveCommand::Propose { tool, description, kind, impact }) => {
            let tool = require(ws, &tool)?;
            let id = tools::propose_improvement(&ws.conn, tool.id, &kind, &description, &impact)?;
            println!("✓ Improvement #{id} proposed for {}", tool.name);
        }
        ToolCommand::Improve(ImproveCommand::List { status }) => {
            for i in tools::list_improvements(&ws.conn, status.as_deref())? {
                let tool = i.tool_name.as_deref().unwrap_or("?");
                println!("#{:<4} [{}] {:<16} {} ({} impact)", i.id, i.status, tool, i.description, i.impact);
            }
        }
        ToolCommand::Improve(ImproveCommand::Implement { id }) => {
            if !tools::implement_improvement(&ws.conn, id)? {
                anyhow::bail!("Improvement #{} not found", id);
            }
            println!("✓ Improvement #{id} implemented");
        }
        ToolCommand::Admin(AdminCommand::Enable { tool, reason }) => {
            let tool = require(ws, &tool)?;
            let admin = ws.config.default_user.clone();
            tools::set_status(&mut ws.conn, &admin, tool.id, ToolStatus::Active, &reason)?;
            println!("✓ {} enabled", tool.name);
        }
        ToolCommand::Admin(AdminCommand::Disable { tool, reason }) => {
            let tool = require(ws, &tool)?;
            let admin = ws.config.default_user.clone();
            tools::set_status(&mut ws.conn, &admin, tool.id, ToolStatus::Disabled, &reason)?;
            println!("✓ {} disabled", tool.name);
        }
        ToolCommand::Admin(AdminCommand::Reset { tool }) => {
            let tool = require(ws, &tool)?;
            let admin = ws.config.default_user.clone();
            tools::reset_stats(&mut ws.conn, &admin, tool.id)?;
            println!("✓ {} statistics reset", tool.name);
        }
        ToolCommand::Admin(AdminCommand::Log { limit }) => {
            for entry in tools::admin_log(&ws.conn, limit)? {
                let target = entry.target_id.map(|id| format!(" #{id}")).unwrap_or_default();
                println!(
                    "{} {:<10} {:<12} {}{} {}",
                    entry.created_at, entry.admin, entry.action, entry.target_type, target, entry.details
                );
            }
        }
        ToolCommand::CheckComponent { component, tool } => {
            let user = ws.config.default_user.clone();
            let health = tools::check_component(&mut ws.conn, &component, &tool, &user, timeout)?;
            println!("{}: {} {}", health.component, health.status, health.message);
        }
        ToolCommand::Components => {
            let (overall, components) = tools::component_status(&ws.conn)?;
            println!("Overall: {overall}");
            for c in components {
                println!("  {:<16} {:<10} {}", c.component, c.status, c.message);
            }
        }
        ToolCommand::Cleanup { days } => {
            let removed = tools::cleanup_executions(&ws.conn, days)?;
            println!("✓ Removed {removed} execution logs older than {days} days");
        }
    }
    Ok(())
}
