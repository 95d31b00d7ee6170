//! Database backups and git snapshots

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use super::Workspace;
use crate::backup;
use crate::store;

#[derive(Subcommand)]
pub enum BackupCommand {
    /// Copy the database into the backup directory
    Create,
    /// Keep daily, weekly and monthly backups and delete the rest
    Rotate,
    /// List backups, newest first
    List,
    /// Replace the database with a backup (the current one is saved first)
    Restore { name: String },
}

#[derive(Subcommand)]
pub enum GitBackupCommand {
    /// Stash uncommitted work and tag the current state
    Create {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// List backup tags, oldest first
    List {
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Check out a backup tag
    Recover {
        tag: String,
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Delete all but the newest backup tags
    Cleanup {
        #[arg(long, default_value_t = 5)]
        keep: usize,
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

/// Takes the workspace by value: restoring must close the database first.
pub fn run(cmd: BackupCommand, ws: Workspace) -> Result<()> {
    let now = store::now();
    let dir = ws.config.backup_dir.clone();
    match cmd {
        BackupCommand::Create => {
            let file = backup::backup_database(&ws.conn, &dir, now)?;
            println!("✓ Backup created: {} ({})", file.path.display(), human_size(file.size));
        }
        BackupCommand::Rotate => {
            let report = backup::rotate(&dir, now.date())?;
            for name in &report.removed {
                println!("✗ Removed {name}");
            }
            println!("✓ Kept {} backups, removed {}", report.kept.len(), report.removed.len());
        }
        BackupCommand::List => {
            let mut backups = backup::list(&dir)?;
            if backups.is_empty() {
                println!("No backups in {}", dir.display());
            }
            backups.sort_by(|a, b| b.name.cmp(&a.name));
            for b in backups {
                println!("{:<36} {:>10}", b.name, human_size(b.size));
            }
        }
        BackupCommand::Restore { name } => {
            let Workspace { conn, config } = ws;
            drop(conn);
            let saved = backup::restore(&name, &config.db_path, &dir, now)?;
            if let Some(saved) = saved {
                println!("✓ Current database saved as {}", saved.display());
            }
            println!("✓ Restored {name}");
        }
    }
    Ok(())
}

pub fn run_git(cmd: GitBackupCommand) -> Result<()> {
    match cmd {
        GitBackupCommand::Create { project, reason } => {
            let tag = backup::git_backup(&project, &reason, store::now())?;
            println!("✓ Snapshot tagged {tag}");
        }
        GitBackupCommand::List { project } => {
            let tags = backup::list_git_backups(&project)?;
            if tags.is_empty() {
                println!("No backup tags.");
            }
            for tag in tags {
                println!("{tag}");
            }
        }
        GitBackupCommand::Recover { tag, project } => {
            backup::git_recover(&project, &tag)?;
            println!("✓ Checked out {tag}");
        }
        GitBackupCommand::Cleanup { keep, project } => {
            let removed = backup::cleanup_old_backups(&project, keep)?;
            for tag in &removed {
                println!("✗ Deleted {tag}");
            }
            println!("✓ Removed {} old backup tags", removed.len());
        }
    }
    Ok(())
}
