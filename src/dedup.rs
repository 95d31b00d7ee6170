//! Near-duplicate title detection across the workspace tables.

use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Tables searched for duplicates, in report order.
const SOURCES: &[&str] = &["ideas", "proposals", "todos", "wiki", "knowledge"];

/// Similarity ratio in `[0, 1]` between two strings, ignoring case.
///
/// `2·M / (|a| + |b|)` where M is the number of characters in the
/// recursively found longest matching blocks.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, ch) in b.iter().enumerate() {
        b2j.entry(*ch).or_default().push(j);
    }

    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`, earliest in `a`
/// then in `b` on ties. Returns `(i, j, len)`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    let mut run_at: HashMap<usize, usize> = HashMap::new();
    for (i, ch) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_run = HashMap::new();
        for &j in b2j.get(ch).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }
            let len = j.checked_sub(1).and_then(|prev| run_at.get(&prev)).copied().unwrap_or(0) + 1;
            next_run.insert(j, len);
            if len > best_len {
                best_i = i + 1 - len;
                best_j = j + 1 - len;
                best_len = len;
            }
        }
        run_at = next_run;
    }
    (best_i, best_j, best_len)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicate {
    pub source: &'static str,
    pub id: i64,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub matches: Vec<Duplicate>,
    /// Sources that could not be read.
    pub skipped: Vec<&'static str>,
}

fn titles(conn: &Connection, table: &str) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(&format!("SELECT id, title FROM {table}"))?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Every stored title scoring at least `threshold` against `title`, best first.
pub fn find_duplicates(conn: &Connection, title: &str, threshold: f64) -> DuplicateReport {
    let mut report = DuplicateReport::default();
    for &source in SOURCES {
        match titles(conn, source) {
            Ok(rows) => {
                for (id, existing) in rows {
                    let score = similarity(title, &existing);
                    if score >= threshold {
                        report.matches.push(Duplicate { source, id, title: existing, score });
                    }
                }
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "duplicate check skipped source");
                report.skipped.push(source);
            }
        }
    }
    report.matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{knowledge, store, todos};

    #[test]
    fn ratio_matches_longest_block_definition() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("Same Title", "same title"), 1.0);
        assert_eq!(similarity("abcd", "bcde"), 0.75);
        assert!(similarity("Fix bug in parser", "Fix bug in parsing") > 0.8);
        assert!(similarity("Add backups", "Rewrite scheduler") < 0.5);
    }

    #[test]
    fn matching_blocks_recurse_on_both_sides() {
        // "ab" and "yz" are matched either side of the central "MID" block.
        let a: Vec<char> = "abMIDyz".chars().collect();
        let b: Vec<char> = "ab--MID--yz".chars().collect();
        assert_eq!(matched_chars(&a, &b), 7);
    }

    #[test]
    fn finds_duplicates_across_tables_best_first() {
        let conn = store::open_in_memory().expect("db");
        let todo = todos::NewTodo { title: "Fix bug in parsing".to_string(), ..Default::default() };
        todos::add(&conn, &todo).expect("todo");
        knowledge::add(&conn, "notes", "Fix bug in parser", "", &[]).expect("kb");
        knowledge::add(&conn, "notes", "Unrelated entry", "", &[]).expect("kb");

        let report = find_duplicates(&conn, "fix bug in parser", DEFAULT_THRESHOLD);
        assert!(report.skipped.is_empty());
        assert_eq!(report.matches.len(), 2);
        assert_eq!(report.matches[0].source, "knowledge");
        assert_eq!(report.matches[0].score, 1.0);
        assert_eq!(report.matches[1].source, "todos");
    }

    #[test]
    fn unreadable_source_is_reported_as_skipped() {
        let conn = store::open_in_memory().expect("db");
        conn.execute_batch("DROP TABLE knowledge;").expect("drop");
        let report = find_duplicates(&conn, "anything", DEFAULT_THRESHOLD);
        assert_eq!(report.skipped, vec!["knowledge"]);
        assert!(report.matches.is_empty());
    }
}
