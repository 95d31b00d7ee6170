//! Session commands
//!
//! Commands that act on a session use `--session ID` when given and the
//! configured user's active session otherwise.

use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;

use super::utils::{parse_json, preview, print_json};
use super::Workspace;
use crate::sessions;

const PREVIEW_CHARS: usize = 70;

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Start a session
    Start {
        #[arg(long)]
        title: Option<String>,
        /// Initial context as JSON
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Return the active session, starting one when there is none
    Resume {
        #[arg(long)]
        user: Option<String>,
    },
    /// End a session
    End {
        #[arg(long)]
        session: Option<i64>,
    },
    /// Recent sessions of a user
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Add a message to a session
    Msg {
        content: String,
        #[arg(long, default_value = "user")]
        role: String,
        /// Metadata as JSON
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        session: Option<i64>,
    },
    /// Show the latest messages of a session
    Messages {
        #[arg(long)]
        session: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Search a user's messages across sessions
    Search {
        query: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Set, get or list session variables
    #[command(subcommand)]
    State(StateCommand),
    /// Bookmark a session, or list its bookmarks without a label
    Bookmark {
        label: Option<String>,
        /// Message the bookmark points at
        #[arg(long)]
        message: Option<i64>,
        #[arg(long)]
        session: Option<i64>,
    },
    /// Counts of messages, bookmarks and variables in a session
    Summary {
        #[arg(long)]
        session: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// Set a variable; VALUE is stored as JSON when it parses, as text otherwise
    Set {
        key: String,
        value: String,
        #[arg(long)]
        session: Option<i64>,
    },
    /// Print a variable
    Get {
        key: String,
        #[arg(long)]
        session: Option<i64>,
    },
    /// Print all variables as JSON
    List {
        #[arg(long)]
        session: Option<i64>,
    },
}

fn current(ws: &Workspace, session: Option<i64>) -> Result<i64> {
    if let Some(id) = session {
        return Ok(id);
    }
    match sessions::active(&ws.conn, &ws.config.default_user)? {
        Some(s) => Ok(s.id),
        None => anyhow::bail!("No active session for {}; pass --session or run `ws session start`", ws.config.default_user),
    }
}

fn state_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn run(cmd: SessionCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    let user_or_default = |user: Option<String>| user.unwrap_or_else(|| ws.config.default_user.clone());

    match cmd {
        SessionCommand::Start { title, context, user } => {
            let context = parse_json(context.as_deref())?;
            let id = sessions::start(conn, &user_or_default(user), title.as_deref(), context.as_ref())?;
            println!("✓ Session #{id} started");
        }
        SessionCommand::Resume { user } => {
            let (id, is_new) = sessions::resume(conn, &user_or_default(user))?;
            println!("✓ Session #{id} {}", if is_new { "started" } else { "resumed" });
        }
        SessionCommand::End { session } => {
            let id = current(ws, session)?;
            if !sessions::end(conn, id)? {
                anyhow::bail!("Session #{} is not active", id);
            }
            println!("✓ Session #{id} ended");
        }
        SessionCommand::List { user, limit } => {
            let list = sessions::list(conn, &user_or_default(user), limit)?;
            if list.is_empty() {
                println!("No sessions.");
            }
            for s in list {
                let ended = s.ended_at.as_deref().map(|e| format!(" → {e}")).unwrap_or_default();
                println!("#{:<4} [{}] {} ({}{})", s.id, s.status, s.title, s.started_at, ended);
            }
        }
        SessionCommand::Msg { content, role, metadata, session } => {
            let id = current(ws, session)?;
            let metadata = parse_json(metadata.as_deref())?;
            let message_id = sessions::add_message(conn, id, &role, &content, metadata.as_ref())?;
            println!("✓ Message #{message_id} added to session #{id}");
        }
        SessionCommand::Messages { session, limit } => {
            let id = current(ws, session)?;
            for m in sessions::messages(conn, id, limit)? {
                println!("#{:<4} {} [{}] {}", m.id, m.created_at, m.role, preview(&m.content, PREVIEW_CHARS));
            }
        }
        SessionCommand::Search { query, user } => {
            let found = sessions::search_messages(conn, &user_or_default(user), &query)?;
            if found.is_empty() {
                println!("No results found.");
            }
            for (m, session_title) in found {
                println!("[{session_title}] #{} {}", m.id, preview(&m.content, PREVIEW_CHARS));
            }
        }
        SessionCommand::State(StateCommand::Set { key, value, session }) => {
            let id = current(ws, session)?;
            sessions::set_state(conn, id, &key, &state_value(&value))?;
            println!("✓ {key} set");
        }
        SessionCommand::State(StateCommand::Get { key, session }) => {
            let id = current(ws, session)?;
            match sessions::get_state(conn, id, &key)? {
                Some(value) => print_json(&value)?,
                None => anyhow::bail!("No variable '{}' in session #{}", key, id),
            }
        }
        SessionCommand::State(StateCommand::List { session }) => {
            let id = current(ws, session)?;
            print_json(&sessions::all_state(conn, id)?)?;
        }
        SessionCommand::Bookmark { label: Some(label), message, session } => {
            let id = current(ws, session)?;
            let bookmark = sessions::add_bookmark(conn, id, &label, message)?;
            println!("✓ Bookmark #{bookmark} '{label}'");
        }
        SessionCommand::Bookmark { label: None, session, .. } => {
            let id = current(ws, session)?;
            for b in sessions::bookmarks(conn, id)? {
                let at = b.message_id.map(|m| format!(" (message #{m})")).unwrap_or_default();
                println!("#{:<4} {}{}", b.id, b.label, at);
            }
        }
        SessionCommand::Summary { session } => {
            let id = current(ws, session)?;
            let Some(summary) = sessions::summary(conn, id)? else {
                anyhow::bail!("Session #{} not found", id);
            };
            let s = &summary.session;
            println!("Session #{}: {} [{}]", s.id, s.title, s.status);
            println!("User:       {}", s.username);
            println!("Started:    {}", s.started_at);
            println!("Messages:   {}", summary.messages);
            println!("Bookmarks:  {}", summary.bookmarks);
            println!("Variables:  {}", summary.state_vars);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_values_fall_back_to_text() {
        assert_eq!(state_value("42"), serde_json::json!(42));
        assert_eq!(state_value("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(state_value("plain words"), Value::String("plain words".into()));
    }
}
