//! Timestamped database copies with calendar-based rotation.

use crate::error::{Result, WsError};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const PREFIX: &str = "workspace_";
const SUFFIX: &str = ".db";
const STAMP: &str = "%Y%m%d_%H%M%S";

const DAILY: i64 = 7;
const WEEKLY: i64 = 4;
const MONTHLY: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

pub fn backup_name(now: NaiveDateTime) -> String {
    format!("{PREFIX}{}{SUFFIX}", now.format(STAMP))
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(PREFIX) && name.ends_with(SUFFIX)
}

/// Write a consistent copy of the open database into `dir`.
pub fn backup_database(conn: &Connection, dir: &Path, now: NaiveDateTime) -> Result<BackupFile> {
    fs::create_dir_all(dir)?;
    let name = backup_name(now);
    let path = dir.join(&name);
    if path.exists() {
        return Err(WsError::InvalidValue {
            field: "backup",
            value: format!("{} already exists", path.display()),
        });
    }
    conn.execute("VACUUM INTO ?1", [path.to_string_lossy().into_owned()])?;
    let size = fs::metadata(&path)?.len();
    tracing::debug!(backup = %path.display(), size, "database backup written");
    Ok(BackupFile { name, path, size })
}

/// Backups in `dir`, newest first. A missing directory has none.
pub fn list(dir: &Path) -> Result<Vec<BackupFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_backup_name(&name) || !entry.file_type()?.is_file() {
            continue;
        }
        backups.push(BackupFile { size: entry.metadata()?.len(), path: entry.path(), name });
    }
    backups.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(backups)
}

/// Dates that earn a slot: each of the last 7 days, the Monday of each of
/// the last 4 weeks and the 1st of each of the last 12 months.
fn slot_dates(today: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for i in 0..DAILY {
        dates.push(today - Duration::days(i));
    }
    for i in 0..WEEKLY {
        let day = today - Duration::weeks(i);
        dates.push(day - Duration::days(i64::from(day.weekday().num_days_from_monday())));
    }
    let (mut year, mut month) = (today.year(), today.month());
    for _ in 0..MONTHLY {
        if let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) {
            dates.push(first);
        }
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    dates
}

/// Names to keep: for every slot date, the first name (in sorted order)
/// containing that date.
pub fn select_kept(names: &[String], today: NaiveDate) -> BTreeSet<String> {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort();
    slot_dates(today)
        .into_iter()
        .filter_map(|date| {
            let stamp = date.format("%Y%m%d").to_string();
            sorted.iter().find(|name| name.contains(&stamp)).map(|name| (*name).clone())
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RotationReport {
    pub kept: Vec<String>,
    pub removed: Vec<String>,
}

pub fn rotate(dir: &Path, today: NaiveDate) -> Result<RotationReport> {
    let names: Vec<String> = list(dir)?.into_iter().map(|b| b.name).collect();
    let keep = select_kept(&names, today);

    let mut report = RotationReport::default();
    for name in names {
        if keep.contains(&name) {
            report.kept.push(name);
        } else {
            fs::remove_file(dir.join(&name))?;
            report.removed.push(name);
        }
    }
    report.kept.sort();
    report.removed.sort();
    tracing::debug!(kept = report.kept.len(), removed = report.removed.len(), "backups rotated");
    Ok(report)
}

/// Replace `db` with a backup from `dir`, first copying the current
/// database next to it as `workspace_before_restore_<ts>.db`.
///
/// Returns the safety copy, if there was a database to copy.
pub fn restore(name: &str, db: &Path, dir: &Path, now: NaiveDateTime) -> Result<Option<PathBuf>> {
    let source = dir.join(name);
    if !is_backup_name(name) || !source.is_file() {
        return Err(WsError::not_found("backup", name));
    }

    let safety = if db.is_file() {
        let parent = db.parent().unwrap_or_else(|| Path::new("."));
        let safety = parent.join(format!("workspace_before_restore_{}.db", now.format(STAMP)));
        fs::copy(db, &safety)?;
        Some(safety)
    } else {
        None
    };

    fs::copy(&source, db)?;
    for sidecar in ["-wal", "-shm"] {
        let mut stale = db.as_os_str().to_owned();
        stale.push(sidecar);
        let stale = PathBuf::from(stale);
        if stale.exists() {
            fs::remove_file(&stale)?;
        }
    }
    tracing::debug!(backup = name, db = %db.display(), "database restored");
    Ok(safety)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{knowledge, store};
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(3, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn rotation_keeps_daily_weekly_and_monthly_slots() {
        // Wednesday 2024-03-20 with one backup per day for the last 30 days.
        let today = at(2024, 3, 20);
        let names: Vec<String> = (0..30).map(|i| backup_name(today - Duration::days(i))).collect();

        let kept = select_kept(&names, today.date());
        let expected: BTreeSet<String> = [
            "20240320", "20240319", "20240318", "20240317", "20240316", "20240315", "20240314",
            "20240311", "20240304", "20240226", "20240301",
        ]
        .iter()
        .map(|d| format!("workspace_{d}_030000.db"))
        .collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn first_backup_of_a_day_wins() {
        let names = vec![
            "workspace_20240320_180000.db".to_string(),
            "workspace_20240320_090000.db".to_string(),
        ];
        let kept = select_kept(&names, at(2024, 3, 20).date());
        assert_eq!(kept.into_iter().collect::<Vec<_>>(), vec!["workspace_20240320_090000.db"]);
    }

    #[test]
    fn monthly_slots_cross_year_boundary() {
        let dates = slot_dates(at(2024, 2, 10).date());
        assert!(dates.contains(&at(2023, 12, 1).date()));
        assert!(dates.contains(&at(2023, 3, 1).date()));
        assert!(!dates.contains(&at(2023, 2, 1).date()));
    }

    #[test]
    fn backup_rotate_and_restore() {
        let tmp = TempDir::new().expect("tmp");
        let db_path = tmp.path().join("ws.db");
        let dir = tmp.path().join("backups");

        let conn = store::open(&db_path).expect("db");
        knowledge::add(&conn, "ops", "Before backup", "", &[]).expect("kb");
        let now = at(2024, 3, 20);
        let backup = backup_database(&conn, &dir, now).expect("backup");
        assert_eq!(backup.name, "workspace_20240320_030000.db");
        assert!(backup_database(&conn, &dir, now).is_err());

        fs::write(dir.join("workspace_20230101_000000.db"), b"old").expect("write");
        fs::write(dir.join("notes.txt"), b"not a backup").expect("write");
        let report = rotate(&dir, now.date()).expect("rotate");
        assert_eq!(report.kept, vec!["workspace_20240320_030000.db"]);
        assert_eq!(report.removed, vec!["workspace_20230101_000000.db"]);
        assert_eq!(list(&dir).expect("list").len(), 1);

        knowledge::add(&conn, "ops", "After backup", "", &[]).expect("kb");
        drop(conn);

        let safety = restore(&backup.name, &db_path, &dir, now + Duration::hours(1))
            .expect("restore")
            .expect("safety copy");
        assert!(safety.ends_with("workspace_before_restore_20240320_040000.db"));

        let conn = store::open(&db_path).expect("reopen");
        let titles: Vec<String> =
            knowledge::by_category(&conn, "ops").expect("entries").into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Before backup"]);
        assert!(restore("workspace_19990101_000000.db", &db_path, &dir, now).is_err());
    }
}
