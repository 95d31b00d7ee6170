//! Todo and progress commands

use anyhow::Result;
use clap::{Args, Subcommand};

use super::utils::parse_csv;
use super::Workspace;
use crate::domain::{Priority, TodoStatus};
use crate::todos::{self, NewTodo, Todo};

const PER_PRIORITY_SHOWN: usize = 5;

#[derive(Args)]
pub struct TodoArgs {
    #[command(subcommand)]
    pub command: Option<TodoCommand>,
}

#[derive(Subcommand)]
pub enum TodoCommand {
    /// Add a todo
    Add {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long)]
        project: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },
    /// List todos, urgent first
    List {
        #[arg(long)]
        status: Option<TodoStatus>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Change the status or priority of a todo
    Update {
        id: i64,
        #[arg(long)]
        status: Option<TodoStatus>,
        #[arg(long)]
        priority: Option<Priority>,
    },
}

#[derive(Subcommand)]
pub enum ProgressCommand {
    /// Record a milestone for a project
    Add {
        project: String,
        milestone: String,
        #[arg(long, default_value = "in_progress")]
        status: String,
        /// Percent complete
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..=100))]
        progress: i64,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List milestones
    List {
        #[arg(long)]
        project: Option<String>,
    },
    /// Update a milestone
    Update {
        id: i64,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=100))]
        progress: Option<i64>,
        #[arg(long)]
        notes: Option<String>,
    },
}

fn print_todo(todo: &Todo) {
    let project = todo.project.as_deref().map(|p| format!(" @{p}")).unwrap_or_default();
    let due = todo.due_date.as_deref().map(|d| format!(" (due {d})")).unwrap_or_default();
    println!("#{:<4} [{}] [{}] {}{}{}", todo.id, todo.priority, todo.status, todo.title, project, due);
}

pub fn run(args: TodoArgs, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    let Some(command) = args.command else {
        let groups = todos::by_priority(conn)?;
        if groups.is_empty() {
            println!("No open todos.");
        }
        for (priority, items) in groups {
            println!("{} ({}):", priority.as_str().to_uppercase(), items.len());
            for todo in items.iter().take(PER_PRIORITY_SHOWN) {
                println!("  #{:<4} {}", todo.id, todo.title);
            }
            if items.len() > PER_PRIORITY_SHOWN {
                println!("  … {} more", items.len() - PER_PRIORITY_SHOWN);
            }
        }
        return Ok(());
    };

    match command {
        TodoCommand::Add { title, description, priority, project, tags, due } => {
            let todo = NewTodo { title, description, priority, project, tags: parse_csv(&tags), due_date: due };
            let id = todos::add(conn, &todo)?;
            println!("✓ Todo #{id} added");
        }
        TodoCommand::List { status, project, priority } => {
            let list: Vec<Todo> = todos::list(conn, status, project.as_deref())?
                .into_iter()
                .filter(|t| priority.map_or(true, |p| t.priority == p))
                .collect();
            if list.is_empty() {
                println!("No todos.");
            }
            list.iter().for_each(print_todo);
        }
        TodoCommand::Update { id, status, priority } => {
            if status.is_none() && priority.is_none() {
                anyhow::bail!("Nothing to update: pass --status or --priority");
            }
            if !todos::update(conn, id, status, priority)? {
                anyhow::bail!("Todo #{} not found", id);
            }
            println!("✓ Todo #{id} updated");
        }
    }
    Ok(())
}

pub fn run_progress(cmd: ProgressCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        ProgressCommand::Add { project, milestone, status, progress, notes } => {
            let id = todos::add_progress(conn, &project, &milestone, &status, progress, &notes)?;
            println!("✓ Milestone #{id} recorded for {project}");
        }
        ProgressCommand::List { project } => {
            let milestones = todos::list_progress(conn, project.as_deref())?;
            if milestones.is_empty() {
                println!("No milestones.");
            }
            let mut current = None;
            for m in milestones {
                if current.as_deref() != Some(m.project.as_str()) {
                    println!("{}:", m.project);
                    current = Some(m.project.clone());
                }
                println!("  #{:<4} {:>3}% [{}] {}", m.id, m.progress, m.status, m.milestone);
                if !m.notes.is_empty() {
                    println!("        {}", m.notes);
                }
            }
        }
        ProgressCommand::Update { id, status, progress, notes } => {
            if !todos::update_progress(conn, id, status.as_deref(), progress, notes.as_deref())? {
                anyhow::bail!("Milestone #{} not found or nothing to update", id);
            }
            println!("✓ Milestone #{id} updated");
        }
    }
    Ok(())
}
