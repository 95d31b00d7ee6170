//! Proposal submission, review, criteria-based validation and conversion
//! into todos.

use crate::domain::{Effort, Impact, ProposalStatus, ReviewOutcome, TodoStatus};
use crate::error::{Result, WsError};
use crate::store::{self, insert_unique};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub impact: Impact,
    pub effort: Effort,
    pub category: String,
    pub status: ProposalStatus,
    pub score: i64,
    pub submitted_by: String,
    pub idea_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Proposal {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            rationale: row.get("rationale")?,
            impact: row.get("impact")?,
            effort: row.get("effort")?,
            category: row.get("category")?,
            status: row.get("status")?,
            score: row.get("score")?,
            submitted_by: row.get("submitted_by")?,
            idea_id: row.get("idea_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub impact: Impact,
    pub effort: Effort,
    pub category: String,
    pub submitted_by: String,
    pub idea_id: Option<i64>,
}

impl NewProposal {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            rationale: String::new(),
            impact: Impact::Medium,
            effort: Effort::Medium,
            category: "improvement".to_string(),
            submitted_by: "user".to_string(),
            idea_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub proposal_id: i64,
    pub reviewer: String,
    pub decision: String,
    pub score: Option<i64>,
    pub comments: String,
    pub criteria_scores: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub weight: i64,
}

/// Outcome of [`auto_validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub decision: ReviewOutcome,
    pub score: i64,
    pub criteria_scores: BTreeMap<String, f64>,
    pub total: f64,
    pub max: f64,
}

pub fn add_criterion(
    conn: &Connection,
    name: &str,
    description: &str,
    weight: i64,
) -> Result<Option<i64>> {
    insert_unique(
        conn,
        "INSERT INTO criteria(name, description, weight) VALUES(?1, ?2, ?3)",
        params![name, description, weight],
    )
}

pub fn list_criteria(conn: &Connection) -> Result<Vec<Criterion>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, weight FROM criteria WHERE active = 1
         ORDER BY weight DESC, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Criterion {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            weight: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn submit(conn: &Connection, proposal: &NewProposal) -> Result<i64> {
    insert(conn, proposal, ProposalStatus::Submitted)
}

pub(crate) fn insert(
    conn: &Connection,
    proposal: &NewProposal,
    status: ProposalStatus,
) -> Result<i64> {
    let now = store::now_ts();
    conn.execute(
        "INSERT INTO proposals(title, description, rationale, impact, effort, category, status,
                               submitted_by, idea_id, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            proposal.title,
            proposal.description,
            proposal.rationale,
            proposal.impact,
            proposal.effort,
            proposal.category,
            status,
            proposal.submitted_by,
            proposal.idea_id,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, table = "proposals", status = %status, "proposal stored");
    Ok(id)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Proposal>> {
    Ok(conn
        .query_row("SELECT * FROM proposals WHERE id = ?1", [id], Proposal::from_row)
        .optional()?)
}

pub fn list(conn: &Connection, status: Option<ProposalStatus>) -> Result<Vec<Proposal>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM proposals WHERE ?1 IS NULL OR status = ?1
         ORDER BY status, score DESC, created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([status], Proposal::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn search(conn: &Connection, query: &str) -> Result<Vec<Proposal>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM proposals WHERE title LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([store::like_pattern(query)], Proposal::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn reviews(conn: &Connection, proposal_id: i64) -> Result<Vec<Review>> {
    let mut stmt = conn.prepare(
        "SELECT id, proposal_id, reviewer, decision, score, comments, criteria_scores, created_at
         FROM reviews WHERE proposal_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([proposal_id], |row| {
        Ok(Review {
            id: row.get(0)?,
            proposal_id: row.get(1)?,
            reviewer: row.get(2)?,
            decision: row.get(3)?,
            score: row.get(4)?,
            comments: row.get(5)?,
            criteria_scores: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Change a proposal's status. The database refuses `converted` unless the
/// proposal was approved or an override was recorded, and refuses to move a
/// converted or rejected proposal anywhere else.
pub(crate) fn set_status(
    conn: &Connection,
    id: i64,
    status: ProposalStatus,
    score: Option<i64>,
) -> Result<()> {
    let current = get(conn, id)?.ok_or_else(|| WsError::not_found("proposal", id))?;
    if current.status.is_terminal() && status != current.status {
        return Err(WsError::Transition {
            from: current.status.to_string(),
            to: status.to_string(),
        });
    }
    let result = conn.execute(
        "UPDATE proposals SET status = ?1, score = COALESCE(?2, score), updated_at = ?3
         WHERE id = ?4",
        params![status, score, store::now_ts(), id],
    );
    match result {
        Ok(_) => {
            tracing::debug!(id, table = "proposals", from = %current.status, status = %status, "status changed");
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("illegal proposal transition") => {
            Err(WsError::Transition {
                from: current.status.to_string(),
                to: status.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Record a review and move the proposal to `decision`.
///
/// `approved` also stores the review score on the proposal. Converted and
/// rejected proposals cannot be reviewed again.
pub fn review(
    conn: &mut Connection,
    id: i64,
    decision: ReviewOutcome,
    reviewer: &str,
    score: i64,
    comments: &str,
    criteria_scores: Option<&BTreeMap<String, f64>>,
) -> Result<()> {
    let tx = conn.transaction()?;
    record_review(&tx, id, decision, reviewer, score, comments, criteria_scores)?;
    tx.commit()?;
    Ok(())
}

fn record_review(
    tx: &Transaction<'_>,
    id: i64,
    decision: ReviewOutcome,
    reviewer: &str,
    score: i64,
    comments: &str,
    criteria_scores: Option<&BTreeMap<String, f64>>,
) -> Result<()> {
    let criteria_json = criteria_scores.map(serde_json::to_string).transpose()?;
    tx.execute(
        "INSERT INTO reviews(proposal_id, reviewer, decision, score, comments, criteria_scores, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, reviewer, decision, score, comments, criteria_json, store::now_ts()],
    )?;
    let stored_score = (decision == ReviewOutcome::Approved).then_some(score);
    set_status(tx, id, decision.into(), stored_score)
}

fn impact_points(impact: Impact) -> f64 {
    match impact {
        Impact::Low => 3.0,
        Impact::Medium => 6.0,
        Impact::High => 9.0,
        Impact::Critical => 10.0,
    }
}

fn effort_points(effort: Effort) -> f64 {
    match effort {
        Effort::Low => 10.0,
        Effort::Medium => 7.0,
        Effort::High => 4.0,
        Effort::VeryHigh => 2.0,
    }
}

/// Score a proposal against weighted criteria. Pure; no database access.
pub fn score_against(proposal: &Proposal, criteria: &[Criterion]) -> Validation {
    let mut criteria_scores = BTreeMap::new();
    let mut total = 0.0;
    let mut max = 0.0;

    for criterion in criteria {
        let weight = criterion.weight as f64;
        max += weight * 10.0;
        let score = match criterion.name.as_str() {
            "impact" => impact_points(proposal.impact) * weight,
            "effort" => effort_points(proposal.effort) * weight,
            "clarity" => {
                let desc = (proposal.description.chars().count() as f64 / 50.0).min(10.0);
                let rationale = if proposal.rationale.chars().count() > 20 { 5.0 } else { 0.0 };
                (desc + rationale) * weight / 2.0
            }
            _ => 5.0 * weight,
        };
        criteria_scores.insert(criterion.name.clone(), (score * 10.0_f64).round() / 10.0);
        total += score;
    }

    let percent = if max > 0.0 { (total / max * 100.0).round() as i64 } else { 0 };
    let decision = match percent {
        p if p >= 70 => ReviewOutcome::Approved,
        p if p >= 50 => ReviewOutcome::NeedsRevision,
        _ => ReviewOutcome::Rejected,
    };

    Validation { decision, score: percent, criteria_scores, total, max }
}

/// Score a stored proposal against the active criteria. Does not change it.
pub fn auto_validate(conn: &Connection, id: i64) -> Result<Option<Validation>> {
    let Some(proposal) = get(conn, id)? else {
        return Ok(None);
    };
    let criteria = list_criteria(conn)?;
    Ok(Some(score_against(&proposal, &criteria)))
}

/// Validate and record the result as a system review.
pub fn validate_and_review(conn: &mut Connection, id: i64) -> Result<Option<Validation>> {
    let Some(validation) = auto_validate(conn, id)? else {
        return Ok(None);
    };
    review(
        conn,
        id,
        validation.decision,
        "system",
        validation.score,
        &format!("Auto-validated: {}%", validation.score),
        Some(&validation.criteria_scores),
    )?;
    Ok(Some(validation))
}

pub(crate) fn insert_todo_for(tx: &Transaction<'_>, proposal: &Proposal, title: &str) -> Result<i64> {
    let now = store::now_ts();
    tx.execute(
        "INSERT INTO todos(title, description, status, priority, project, proposal_id, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            title,
            format!("From Proposal #{}\n\n{}", proposal.id, proposal.description),
            TodoStatus::Todo,
            proposal.impact.priority(),
            proposal.category,
            proposal.id,
            now
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Whether a todo was already created from this proposal.
pub(crate) fn has_todo(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM todos WHERE proposal_id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// Turn an approved proposal into a todo. Returns `None` when the proposal
/// does not exist, is not approved or already has a todo.
pub fn convert_to_todo(conn: &mut Connection, id: i64) -> Result<Option<i64>> {
    let tx = conn.transaction()?;
    let Some(proposal) = get(&tx, id)? else {
        return Ok(None);
    };
    if proposal.status != ProposalStatus::Approved {
        tracing::debug!(id, status = %proposal.status, "proposal not approved, not converting");
        return Ok(None);
    }
    if has_todo(&tx, id)? {
        tracing::debug!(id, "proposal already has a todo, not converting");
        return Ok(None);
    }
    let todo_id = insert_todo_for(&tx, &proposal, &proposal.title)?;
    set_status(&tx, id, ProposalStatus::Converted, None)?;
    tx.commit()?;
    tracing::debug!(id, todo_id, "proposal converted");
    Ok(Some(todo_id))
}

pub fn count_by_status(conn: &Connection, status: ProposalStatus) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM proposals WHERE status = ?1", [status], |row| {
        row.get(0)
    })?)
}
