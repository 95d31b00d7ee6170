//! Users, discussions, assignments and notifications

use anyhow::Result;
use clap::Subcommand;

use super::Workspace;
use crate::collab::{self, Context};
use crate::domain::DiscussionStatus;

#[derive(Subcommand)]
pub enum UserCommand {
    /// Add a user
    Add {
        username: String,
        #[arg(long, default_value = "contributor")]
        role: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Change a user's role
    Role { username: String, role: String },
    /// List users
    List {
        #[arg(long)]
        role: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DiscussCommand {
    /// Open a discussion, optionally about an item (e.g. --on proposal --id 3)
    Start {
        title: String,
        #[arg(long, requires = "id")]
        on: Option<String>,
        #[arg(long, requires = "on")]
        id: Option<i64>,
        #[arg(long)]
        by: Option<String>,
    },
    /// Comment on a discussion
    Comment {
        discussion: i64,
        content: String,
        /// Id of the comment being answered
        #[arg(long)]
        reply_to: Option<i64>,
        #[arg(long)]
        by: Option<String>,
    },
    /// Close a discussion
    Close { discussion: i64 },
    /// List discussions
    List {
        #[arg(long)]
        status: Option<DiscussionStatus>,
        /// Only discussions about this kind of item
        #[arg(long)]
        on: Option<String>,
    },
    /// Show a discussion with its comments
    Show { discussion: i64 },
}

#[derive(Subcommand)]
pub enum AssignCommand {
    /// Assign an item to a user
    Create {
        item_type: String,
        item_id: i64,
        to: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Change the status of an assignment
    Update { id: i64, status: String },
    /// List assignments
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum NotifyCommand {
    /// Show notifications for a user
    List {
        #[arg(long)]
        user: Option<String>,
        /// Include notifications already read
        #[arg(long)]
        all: bool,
    },
    /// Mark a notification as read
    Read { id: i64 },
    /// Send a notification to a user
    Send {
        user: String,
        message: String,
        #[arg(long, default_value = "message")]
        kind: String,
        #[arg(long)]
        link: Option<String>,
    },
}

pub fn run_user(cmd: UserCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        UserCommand::Add { username, role, email } => match collab::add_user(conn, &username, &role, email.as_deref())? {
            Some(id) => println!("✓ User #{id} '{username}' added ({role})"),
            None => anyhow::bail!("User '{}' already exists", username),
        },
        UserCommand::Role { username, role } => {
            if !collab::update_role(conn, &username, &role)? {
                anyhow::bail!("User '{}' not found", username);
            }
            println!("✓ {username} is now {role}");
        }
        UserCommand::List { role } => {
            for user in collab::list_users(conn, role.as_deref())? {
                let state = if user.active { "" } else { " (inactive)" };
                println!("{:<20} {:<12}{}", user.username, user.role, state);
            }
        }
    }
    Ok(())
}

pub fn run_discuss(cmd: DiscussCommand, ws: &mut Workspace) -> Result<()> {
    match cmd {
        DiscussCommand::Start { title, on, id, by } => {
            let by = by.unwrap_or_else(|| ws.config.default_user.clone());
            let context = on.as_deref().zip(id).map(|(kind, id)| Context { kind, id });
            let id = collab::start(&ws.conn, &title, &by, context)?;
            println!("✓ Discussion #{id} started");
        }
        DiscussCommand::Comment { discussion, content, reply_to, by } => {
            let by = by.unwrap_or_else(|| ws.config.default_user.clone());
            let id = collab::add_comment(&mut ws.conn, discussion, &by, &content, reply_to)?;
            println!("✓ Comment #{id} added to discussion #{discussion}");
        }
        DiscussCommand::Close { discussion } => {
            if !collab::close(&ws.conn, discussion)? {
                anyhow::bail!("Discussion #{} not found", discussion);
            }
            println!("✓ Discussion #{discussion} closed");
        }
        DiscussCommand::List { status, on } => {
            let list = collab::list(&ws.conn, status, on.as_deref())?;
            if list.is_empty() {
                println!("No discussions.");
            }
            for d in list {
                let about = match (&d.context_type, d.context_id) {
                    (Some(kind), Some(id)) => format!(" ({kind} #{id})"),
                    _ => String::new(),
                };
                println!("#{:<4} [{}] {}{}", d.id, d.status, d.title, about);
            }
        }
        DiscussCommand::Show { discussion } => {
            let Some((d, comments)) = collab::get_with_comments(&ws.conn, discussion)? else {
                anyhow::bail!("Discussion #{} not found", discussion);
            };
            println!("#{} {} [{}]", d.id, d.title, d.status);
            println!("Started by {} at {}\n", d.created_by, d.created_at);
            for c in comments {
                let indent = if c.reply_to.is_some() { "    " } else { "" };
                println!("{indent}#{} {} ({}):", c.id, c.author, c.created_at);
                println!("{indent}  {}", c.content);
            }
        }
    }
    Ok(())
}

pub fn run_assign(cmd: AssignCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        AssignCommand::Create { item_type, item_id, to, by } => {
            let by = by.unwrap_or_else(|| ws.config.default_user.clone());
            let id = collab::assign(conn, &item_type, item_id, &to, &by)?;
            println!("✓ Assignment #{id}: {item_type} #{item_id} → {to}");
        }
        AssignCommand::Update { id, status } => {
            if !collab::update_assignment(conn, id, &status)? {
                anyhow::bail!("Assignment #{} not found", id);
            }
            println!("✓ Assignment #{id} → {status}");
        }
        AssignCommand::List { user, status } => {
            let list = collab::list_assignments(conn, user.as_deref(), status.as_deref())?;
            if list.is_empty() {
                println!("No assignments.");
            }
            for a in list {
                println!(
                    "#{:<4} [{}] {} #{} → {} (by {})",
                    a.id, a.status, a.item_type, a.item_id, a.assigned_to, a.assigned_by
                );
            }
        }
    }
    Ok(())
}

pub fn run_notify(cmd: NotifyCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        NotifyCommand::List { user, all } => {
            let user = user.unwrap_or_else(|| ws.config.default_user.clone());
            let list = collab::notifications(conn, &user, !all)?;
            if list.is_empty() {
                println!("No notifications for {user}.");
            }
            for n in list {
                let marker = if n.read { " " } else { "•" };
                let link = n.link.as_deref().map(|l| format!(" → {l}")).unwrap_or_default();
                println!("{marker} #{:<4} [{}] {}{}", n.id, n.kind, n.message, link);
            }
        }
        NotifyCommand::Read { id } => {
            if !collab::mark_read(conn, id)? {
                anyhow::bail!("Notification #{} not found", id);
            }
            println!("✓ Notification #{id} read");
        }
        NotifyCommand::Send { user, message, kind, link } => {
            collab::notify_user(conn, &user, &kind, &message, link.as_deref())?;
            println!("✓ Notified {user}");
        }
    }
    Ok(())
}
