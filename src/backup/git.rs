//! Project snapshots as annotated git tags.
//!
//! Uncommitted work is stashed (including untracked files) and the current
//! commit is tagged `backup/<reason>/<timestamp>`.

use crate::error::{Result, WsError};
use crate::process::{self, Outcome};
use chrono::NaiveDateTime;
use std::path::Path;
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const TAG_PREFIX: &str = "backup/";

fn git(project: &Path, args: &[&str]) -> Result<Outcome> {
    let dir = project.to_string_lossy();
    let mut argv = vec!["-C", dir.as_ref()];
    argv.extend_from_slice(args);
    let outcome = process::run_program("git", &argv, None, GIT_TIMEOUT);
    if outcome.success() {
        Ok(outcome)
    } else {
        let message = if outcome.stderr.trim().is_empty() {
            format!("exited with {}", outcome.status)
        } else {
            outcome.stderr.trim().to_string()
        };
        Err(WsError::Process { command: format!("git {}", args.join(" ")), message })
    }
}

fn ensure_repository(project: &Path) -> Result<()> {
    if project.join(".git").exists() {
        Ok(())
    } else {
        Err(WsError::not_found("git repository", project.display()))
    }
}

/// Tag-safe form of a free-text reason.
fn reason_slug(reason: &str) -> String {
    let slug: String = reason
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if slug.is_empty() {
        "manual".to_string()
    } else {
        slug
    }
}

/// Stash local changes and tag the current commit. Returns the tag name.
pub fn git_backup(project: &Path, reason: &str, now: NaiveDateTime) -> Result<String> {
    ensure_repository(project)?;
    let message = format!("Backup: {reason}");
    let tag = format!("{TAG_PREFIX}{}/{}", reason_slug(reason), now.format("%Y%m%d_%H%M%S"));

    git(project, &["stash", "push", "-u", "-m", &message])?;
    git(project, &["tag", "-a", &tag, "-m", &message])?;
    tracing::debug!(project = %project.display(), tag = %tag, "git backup created");
    Ok(tag)
}

/// Backup tags, oldest first by their timestamp component.
pub fn list_git_backups(project: &Path) -> Result<Vec<String>> {
    ensure_repository(project)?;
    let outcome = git(project, &["tag", "-l", "backup/*"])?;
    let mut tags: Vec<String> =
        outcome.stdout.lines().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect();
    tags.sort_by(|a, b| {
        let stamp = |t: &str| t.rsplit('/').next().unwrap_or_default().to_string();
        stamp(a).cmp(&stamp(b)).then_with(|| a.cmp(b))
    });
    Ok(tags)
}

pub fn git_recover(project: &Path, tag: &str) -> Result<()> {
    ensure_repository(project)?;
    if !tag.starts_with(TAG_PREFIX) {
        return Err(WsError::InvalidValue { field: "backup tag", value: tag.to_string() });
    }
    git(project, &["checkout", tag])?;
    Ok(())
}

/// Delete all but the `keep_recent` newest backup tags. Returns the deleted tags.
pub fn cleanup_old_backups(project: &Path, keep_recent: usize) -> Result<Vec<String>> {
    let tags = list_git_backups(project)?;
    if tags.len() <= keep_recent {
        return Ok(Vec::new());
    }
    let stale = &tags[..tags.len() - keep_recent];
    let mut removed = Vec::with_capacity(stale.len());
    for tag in stale {
        match git(project, &["tag", "-d", tag]) {
            Ok(_) => removed.push(tag.clone()),
            Err(e) => tracing::warn!(tag = %tag, error = %e, "failed to delete backup tag"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid time")
    }

    /// A repository with one commit, or `None` when git is not installed.
    fn repo() -> Option<TempDir> {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path();
        let init = process::run_program("git", &["init", "-q"], Some(path), GIT_TIMEOUT);
        if init.unavailable() {
            return None;
        }
        fs::write(path.join("README.md"), "hello\n").expect("write");
        for args in [
            vec!["config", "user.email", "ws@example.invalid"],
            vec!["config", "user.name", "ws"],
            vec!["add", "README.md"],
            vec!["commit", "-q", "-m", "initial"],
        ] {
            assert!(process::run_program("git", &args, Some(path), GIT_TIMEOUT).success());
        }
        Some(tmp)
    }

    #[test]
    fn missing_repository_is_an_error() {
        let tmp = TempDir::new().expect("tmp");
        let err = git_backup(tmp.path(), "manual", at(1)).expect_err("not a repo");
        assert!(err.to_string().contains("git repository"));
        assert!(list_git_backups(tmp.path()).is_err());
    }

    #[test]
    fn reason_is_made_tag_safe() {
        assert_eq!(reason_slug("before big refactor"), "before-big-refactor");
        assert_eq!(reason_slug("  "), "manual");
    }

    #[test]
    fn backup_list_and_cleanup() {
        let Some(tmp) = repo() else { return };
        let path = tmp.path();
        fs::write(path.join("scratch.txt"), "wip").expect("write");

        let first = git_backup(path, "pre-release", at(1)).expect("backup");
        assert_eq!(first, "backup/pre-release/20240501_010000");
        assert!(!path.join("scratch.txt").exists(), "untracked work is stashed");
        git_backup(path, "manual", at(2)).expect("backup");
        git_backup(path, "manual", at(3)).expect("backup");

        let tags = list_git_backups(path).expect("list");
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0], first);

        let removed = cleanup_old_backups(path, 2).expect("cleanup");
        assert_eq!(removed, vec![first]);
        assert_eq!(list_git_backups(path).expect("list").len(), 2);
        assert!(git_recover(path, "main").is_err());
    }
}
