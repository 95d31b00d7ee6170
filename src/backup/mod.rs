//! Database file backups and git-based project snapshots.

pub mod file;
pub mod git;

pub use file::{backup_database, list, restore, rotate, BackupFile, RotationReport};
pub use git::{cleanup_old_backups, git_backup, git_recover, list_git_backups};
