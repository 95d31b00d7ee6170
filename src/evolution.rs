//! Workspace growth over time: metric snapshots and entity counts.

use crate::error::Result;
use crate::store;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metric name and the query that measures it.
const METRICS: &[(&str, &str)] = &[
    ("ideas_high_quality", "SELECT COUNT(*) FROM ideas WHERE reality_score >= 70"),
    ("ideas_total", "SELECT COUNT(*) FROM ideas"),
    ("proposals_total", "SELECT COUNT(*) FROM proposals"),
    ("proposals_approved", "SELECT COUNT(*) FROM proposals WHERE status = 'approved'"),
    ("todos_total", "SELECT COUNT(*) FROM todos"),
    ("todos_completed", "SELECT COUNT(*) FROM todos WHERE status = 'done'"),
    ("tools_count", "SELECT COUNT(*) FROM tools"),
    ("knowledge_items", "SELECT COUNT(*) FROM knowledge"),
];

const COUNTED_TABLES: &[&str] = &["ideas", "proposals", "todos", "discussions", "wiki", "knowledge"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub captured_at: String,
    pub notes: String,
    pub metrics: BTreeMap<String, i64>,
}

/// Change of one metric between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Growth {
    pub metric: String,
    pub change: i64,
    /// Relative to the first value; 0 when that was 0.
    pub percent: f64,
}

/// Current value of every tracked metric.
pub fn capture(conn: &Connection) -> Result<BTreeMap<String, i64>> {
    let mut metrics = BTreeMap::new();
    for (name, sql) in METRICS {
        let value: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        metrics.insert((*name).to_string(), value);
    }
    Ok(metrics)
}

/// Capture the metrics and store them under one timestamp.
pub fn snapshot(conn: &mut Connection, notes: &str, now: NaiveDateTime) -> Result<Snapshot> {
    let tx = conn.transaction()?;
    let metrics = capture(&tx)?;
    let captured_at = store::format_ts(now);
    for (metric, value) in &metrics {
        tx.execute(
            "INSERT INTO system_evolution(captured_at, metric, value, notes) VALUES(?1, ?2, ?3, ?4)",
            params![captured_at, metric, value, notes],
        )?;
    }
    tx.commit()?;
    tracing::debug!(captured_at = %captured_at, metrics = metrics.len(), "evolution snapshot stored");
    Ok(Snapshot { captured_at, notes: notes.to_string(), metrics })
}

/// Every stored snapshot, oldest first.
pub fn timeline(conn: &Connection) -> Result<Vec<Snapshot>> {
    let mut stmt = conn.prepare(
        "SELECT captured_at, notes, metric, value FROM system_evolution ORDER BY captured_at, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut snapshots: Vec<Snapshot> = Vec::new();
    for row in rows {
        let (captured_at, notes, metric, value) = row?;
        match snapshots.last_mut() {
            Some(last) if last.captured_at == captured_at => {
                last.metrics.insert(metric, value);
            }
            _ => snapshots.push(Snapshot {
                captured_at,
                notes,
                metrics: BTreeMap::from([(metric, value)]),
            }),
        }
    }
    Ok(snapshots)
}

/// Change of each metric present in both snapshots.
pub fn growth(first: &Snapshot, last: &Snapshot) -> Vec<Growth> {
    first
        .metrics
        .iter()
        .filter_map(|(metric, &before)| {
            let after = *last.metrics.get(metric)?;
            let change = after - before;
            let percent = if before > 0 { change as f64 / before as f64 * 100.0 } else { 0.0 };
            Some(Growth { metric: metric.clone(), change, percent })
        })
        .collect()
}

/// Entity counts with proposal and todo breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrowthReview {
    pub counts: BTreeMap<String, i64>,
    pub proposals_by_status: BTreeMap<String, i64>,
    pub todos_by_priority: BTreeMap<String, i64>,
}

impl GrowthReview {
    pub fn count(&self, table: &str) -> i64 {
        self.counts.get(table).copied().unwrap_or(0)
    }
}

fn grouped(conn: &Connection, sql: &str) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
}

pub fn review_growth(conn: &Connection) -> Result<GrowthReview> {
    let mut counts = BTreeMap::new();
    for table in COUNTED_TABLES {
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        counts.insert((*table).to_string(), count);
    }
    Ok(GrowthReview {
        counts,
        proposals_by_status: grouped(conn, "SELECT status, COUNT(*) FROM proposals GROUP BY status")?,
        todos_by_priority: grouped(conn, "SELECT priority, COUNT(*) FROM todos GROUP BY priority")?,
    })
}
