//! Gated pipeline: idea → proposal (review) → todo (discussion).
//!
//! Each step is checked by a gate that returns a [`GateDecision`] instead of
//! failing. Forcing a step past its gate requires an [`Override`], which is
//! written to `workflow_overrides` so the bypass stays visible. The database
//! itself refuses to mark a proposal converted unless it was approved or such
//! an override exists.

use crate::collab::{self, Context};
use crate::domain::{Effort, Impact, Priority, ProposalStatus, ReviewOutcome};
use crate::error::{ParseValueError, Result, WsError};
use crate::ideas;
use crate::proposals::{self, NewProposal, Proposal};
use crate::store::{self, truncate};
use crate::todos;
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;

pub const MIN_REALITY: i64 = 50;

const VAGUE_WORDS: &[&str] = &["maybe", "perhaps", "might", "could", "possibly"];
const PLACEHOLDER_WORDS: &[&str] = &["test", "mock", "demo", "example", "sample"];
const FALLBACK_DESCRIPTION: &str = "Auto-generated from extracted ideas";

/// Blocking problems and advisory notes found in a proposal's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlawReport {
    pub flaws: Vec<String>,
    pub warnings: Vec<String>,
}

impl FlawReport {
    pub fn is_clean(&self) -> bool {
        self.flaws.is_empty()
    }
}

pub struct FlawDetector;

impl FlawDetector {
    pub fn check(title: &str, description: &str) -> FlawReport {
        let mut report = FlawReport::default();
        let title_lc = title.to_lowercase();
        let desc_lc = description.to_lowercase();
        let title_len = title.chars().count();

        if title_len < 10 {
            report.flaws.push("Title too short (< 10 chars)".to_string());
        }
        if title_len > 200 {
            report.warnings.push("Title very long (> 200 chars)".to_string());
        }
        if description.chars().count() < 20 {
            report.flaws.push("Description missing or too short".to_string());
        }
        if VAGUE_WORDS.iter().any(|w| title_lc.contains(w)) {
            report.warnings.push("Title contains vague language".to_string());
        }
        if !desc_lc.contains("reality") && !desc_lc.contains("source") {
            report.warnings.push("Missing reality score or source context".to_string());
        }
        if title_lc.contains("duplicate") || desc_lc.contains("duplicate") {
            report.flaws.push("Marked as duplicate".to_string());
        }
        if PLACEHOLDER_WORDS.iter().any(|w| title_lc.contains(w)) {
            report.warnings.push("Contains test/mock/demo indicators".to_string());
        }
        report
    }
}

/// Whether a workflow step may proceed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
    pub warnings: Vec<String>,
}

impl GateDecision {
    fn allow(warnings: Vec<String>) -> Self {
        Self { allowed: true, reason: "OK".to_string(), warnings }
    }

    fn deny(reason: impl Into<String>, warnings: Vec<String>) -> Self {
        Self { allowed: false, reason: reason.into(), warnings }
    }
}

/// Who forced a step past its gate, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub actor: String,
    pub reason: String,
}

/// Result of a workflow step: the gate decision and, when it ran, the id of
/// the created row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub decision: GateDecision,
    pub created_id: Option<i64>,
}

impl StepOutcome {
    fn blocked(decision: GateDecision) -> Self {
        Self { decision, created_id: None }
    }
}

pub fn can_create_proposal_from_idea(conn: &Connection, idea_id: i64) -> Result<GateDecision> {
    let Some(idea) = ideas::get(conn, idea_id)? else {
        return Ok(GateDecision::deny("Idea not found", vec![]));
    };
    if idea.reality_score < MIN_REALITY {
        return Ok(GateDecision::deny(
            format!("Reality score too low ({}% < {MIN_REALITY}%)", idea.reality_score),
            vec![],
        ));
    }
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM proposals WHERE idea_id = ?1",
        [idea_id],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Ok(GateDecision::deny("Already converted to proposal", vec![]));
    }
    Ok(GateDecision::allow(vec![]))
}

fn has_discussion(conn: &Connection, proposal: &Proposal) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM discussions WHERE proposal_id = ?1 OR title LIKE ?2 ESCAPE '\\'",
        params![proposal.id, store::like_pattern(&truncate(&proposal.title, 30))],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn already_converted(conn: &Connection, proposal: &Proposal) -> Result<bool> {
    if proposal.status == ProposalStatus::Converted {
        return Ok(true);
    }
    proposals::has_todo(conn, proposal.id)
}

pub fn can_convert_proposal_to_todo(conn: &Connection, proposal_id: i64) -> Result<GateDecision> {
    let Some(proposal) = proposals::get(conn, proposal_id)? else {
        return Ok(GateDecision::deny("Proposal not found", vec![]));
    };
    if already_converted(conn, &proposal)? {
        return Ok(GateDecision::deny("Already converted to todo", vec![]));
    }
    if !proposal.status.is_convertible() {
        return Ok(GateDecision::deny(
            format!("Proposal not approved (status: {}). Review required!", proposal.status),
            vec![],
        ));
    }
    if !has_discussion(conn, &proposal)? {
        return Ok(GateDecision::deny("No discussion found. Discussion required!", vec![]));
    }
    let report = FlawDetector::check(&proposal.title, &proposal.description);
    if !report.is_clean() {
        return Ok(GateDecision::deny(
            format!("Flaws detected: {}", report.flaws.join(", ")),
            report.warnings,
        ));
    }
    Ok(GateDecision::allow(report.warnings))
}

fn record_override(tx: &Transaction<'_>, proposal_id: i64, action: &str, by: &Override) -> Result<()> {
    tx.execute(
        "INSERT INTO workflow_overrides(proposal_id, action, actor, reason, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![proposal_id, action, by.actor, by.reason, store::now_ts()],
    )?;
    tracing::warn!(proposal_id, action, actor = %by.actor, reason = %by.reason, "workflow gate overridden");
    Ok(())
}

/// Upper-case the first letter of each word, lower-case the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
        } else {
            out.push(ch);
        }
        prev_alpha = ch.is_alphabetic();
    }
    out
}

/// Impact and effort guessed from how real the idea looks.
pub fn sizing_for_reality(reality: i64) -> (Impact, Effort) {
    match reality {
        r if r >= 95 => (Impact::High, Effort::Low),
        r if r >= 85 => (Impact::Medium, Effort::Medium),
        _ => (Impact::Low, Effort::High),
    }
}

/// Create a `needs_review` proposal and its discussion from an idea.
pub fn create_proposal_from_idea(
    conn: &mut Connection,
    idea_id: i64,
    actor: &str,
    force: Option<&Override>,
) -> Result<StepOutcome> {
    if force.is_none() {
        let decision = can_create_proposal_from_idea(conn, idea_id)?;
        if !decision.allowed {
            return Ok(StepOutcome::blocked(decision));
        }
    }
    let Some(idea) = ideas::get(conn, idea_id)? else {
        return Ok(StepOutcome::blocked(GateDecision::deny("Idea not found", vec![])));
    };

    let (impact, effort) = sizing_for_reality(idea.reality_score);
    let title = format!("{}: {}", title_case(&idea.category), truncate(&idea.title, 60));
    let body = if idea.description.trim().is_empty() { FALLBACK_DESCRIPTION } else { idea.description.as_str() };
    let description = format!("Reality: {}%\nSource: Idea #{}\n\n{}", idea.reality_score, idea.id, body);

    let report = FlawDetector::check(&title, &description);
    if !report.is_clean() && force.is_none() {
        return Ok(StepOutcome::blocked(GateDecision::deny(
            format!("Flaws detected: {}", report.flaws.join(", ")),
            report.warnings,
        )));
    }

    let proposal = NewProposal {
        impact,
        effort,
        category: idea.category.clone(),
        submitted_by: actor.to_string(),
        idea_id: Some(idea.id),
        ..NewProposal::new(&title, &description)
    };
    let tx = conn.transaction()?;
    let proposal_id = proposals::insert(&tx, &proposal, ProposalStatus::NeedsReview)?;
    collab::insert_discussion(
        &tx,
        &format!("Discussion: {}", truncate(&title, 60)),
        actor,
        Some(Context { kind: "proposal", id: proposal_id }),
    )?;
    if let Some(by) = force {
        record_override(&tx, proposal_id, "create", by)?;
    }
    tx.commit()?;

    tracing::debug!(idea_id, proposal_id, "proposal created from idea");
    Ok(StepOutcome { decision: GateDecision::allow(report.warnings), created_id: Some(proposal_id) })
}

/// Create a todo from a proposal that passed its gate, and mark it converted.
///
/// With an override the approval, discussion and flaw checks are skipped,
/// but a proposal is never converted twice.
pub fn convert_proposal_to_todo(
    conn: &mut Connection,
    proposal_id: i64,
    force: Option<&Override>,
) -> Result<StepOutcome> {
    let decision = match force {
        None => can_convert_proposal_to_todo(conn, proposal_id)?,
        Some(_) => match proposals::get(conn, proposal_id)? {
            None => GateDecision::deny("Proposal not found", vec![]),
            Some(p) if already_converted(conn, &p)? => {
                GateDecision::deny("Already converted to todo", vec![])
            }
            Some(p) => GateDecision::allow(FlawDetector::check(&p.title, &p.description).warnings),
        },
    };
    if !decision.allowed {
        return Ok(StepOutcome::blocked(decision));
    }

    let tx = conn.transaction()?;
    let proposal = proposals::get(&tx, proposal_id)?
        .ok_or_else(|| WsError::not_found("proposal", proposal_id))?;
    if let Some(by) = force {
        record_override(&tx, proposal_id, "convert", by)?;
    }
    let todo_id = proposals::insert_todo_for(&tx, &proposal, &truncate(&proposal.title, 100))?;
    proposals::set_status(&tx, proposal_id, ProposalStatus::Converted, None)?;
    tx.commit()?;

    tracing::debug!(proposal_id, todo_id, forced = force.is_some(), "proposal converted to todo");
    Ok(StepOutcome { decision, created_id: Some(todo_id) })
}

const POPULATE_MIN_REALITY: i64 = 80;
const POPULATE_PROPOSAL_LIMIT: usize = 50;
const POPULATE_TODO_LIMIT: usize = 30;
const POPULATE_CATEGORIES: &[&str] = &["todo", "pattern"];

/// Rows created by one [`populate`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulateReport {
    pub proposals: Vec<i64>,
    pub discussions: Vec<i64>,
    pub todos: Vec<i64>,
    /// Ideas whose gate refused a proposal.
    pub blocked: usize,
}

/// Priority of a todo taken straight from an idea.
pub fn todo_priority_for_idea(title: &str, reality: i64) -> Priority {
    let title = title.to_lowercase();
    if title.contains("security") || title.contains("bug") {
        return Priority::Urgent;
    }
    match reality {
        r if r >= 95 => Priority::High,
        r if r >= 85 => Priority::Medium,
        _ => Priority::Low,
    }
}

fn todo_exists_like(conn: &Connection, title: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM todos WHERE title LIKE ?1 ESCAPE '\\')",
        [store::like_pattern(&truncate(title, 30))],
        |row| row.get(0),
    )?)
}

/// Batch pass over high-value ideas.
///
/// Todo and pattern ideas with a reality of at least 80 go through the
/// proposal gate, submitted proposals without a discussion get one, and
/// todo ideas become todos unless a todo with a matching title exists.
pub fn populate(conn: &mut Connection, actor: &str) -> Result<PopulateReport> {
    let mut report = PopulateReport::default();

    let mut candidates = Vec::new();
    for category in POPULATE_CATEGORIES {
        candidates.extend(ideas::list(conn, Some(*category), POPULATE_MIN_REALITY)?);
    }
    candidates.sort_by(|a, b| b.reality_score.cmp(&a.reality_score).then(a.id.cmp(&b.id)));
    for idea in candidates.iter().take(POPULATE_PROPOSAL_LIMIT) {
        let outcome = create_proposal_from_idea(conn, idea.id, actor, None)?;
        match outcome.created_id {
            Some(id) => report.proposals.push(id),
            None => {
                tracing::debug!(idea_id = idea.id, reason = %outcome.decision.reason, "idea not proposed");
                report.blocked += 1;
            }
        }
    }

    for proposal in proposals::list(conn, Some(ProposalStatus::Submitted))? {
        if has_discussion(conn, &proposal)? {
            continue;
        }
        let id = collab::insert_discussion(
            conn,
            &format!("Discussion: {}", truncate(&proposal.title, 60)),
            actor,
            Some(Context { kind: "proposal", id: proposal.id }),
        )?;
        report.discussions.push(id);
    }

    for idea in ideas::list(conn, Some("todo"), POPULATE_MIN_REALITY)?.into_iter().take(POPULATE_TODO_LIMIT) {
        if todo_exists_like(conn, &idea.title)? {
            continue;
        }
        let todo = todos::NewTodo {
            title: truncate(&idea.title, 100),
            description: format!("From Idea #{} (reality {}%)\n\n{}", idea.id, idea.reality_score, idea.description),
            priority: Some(todo_priority_for_idea(&idea.title, idea.reality_score)),
            ..Default::default()
        };
        report.todos.push(todos::add(conn, &todo)?);
    }

    tracing::debug!(
        proposals = report.proposals.len(),
        discussions = report.discussions.len(),
        todos = report.todos.len(),
        blocked = report.blocked,
        "workspace populated"
    );
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
    Revise,
}

impl ReviewDecision {
    fn outcome(self) -> (ReviewOutcome, i64, &'static str) {
        match self {
            ReviewDecision::Approve => (ReviewOutcome::Approved, 100, "approve"),
            ReviewDecision::Reject => (ReviewOutcome::Rejected, 0, "reject"),
            ReviewDecision::Revise => (ReviewOutcome::NeedsRevision, 50, "revise"),
        }
    }
}

/// Record a workflow review and move the proposal accordingly.
pub fn review(
    conn: &mut Connection,
    proposal_id: i64,
    decision: ReviewDecision,
    reviewer: &str,
    feedback: &str,
) -> Result<ProposalStatus> {
    let (outcome, score, _) = decision.outcome();
    if proposals::get(conn, proposal_id)?.is_none() {
        return Err(WsError::not_found("proposal", proposal_id));
    }
    proposals::review(conn, proposal_id, outcome, reviewer, score, feedback, None)?;
    Ok(outcome.into())
}

impl std::str::FromStr for ReviewDecision {
    type Err = ParseValueError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [ReviewDecision::Approve, ReviewDecision::Reject, ReviewDecision::Revise]
            .into_iter()
            .find(|d| d.outcome().2 == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ParseValueError {
                kind: "review decision",
                value: s.to_string(),
                expected: "approve, reject, revise".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ideas::NewIdea;
    use crate::todos;

    fn idea(conn: &Connection, reality: i64) -> i64 {
        let mut new = NewIdea::manual("Cache parsed configuration between runs");
        new.category = "performance".to_string();
        new.description = "Parsing dominates start-up time on large workspaces".to_string();
        new.reality_score = reality;
        ideas::add(conn, &new).expect("idea")
    }

    fn admin() -> Override {
        Override { actor: "root".to_string(), reason: "hotfix".to_string() }
    }

    #[test]
    fn flaw_detector_separates_flaws_from_warnings() {
        let report = FlawDetector::check("Short", "");
        assert_eq!(report.flaws, vec!["Title too short (< 10 chars)", "Description missing or too short"]);

        let report = FlawDetector::check(
            "Maybe add a demo page",
            "Source: Idea #4, gives new users a working walkthrough",
        );
        assert!(report.is_clean());
        assert_eq!(report.warnings, vec!["Title contains vague language", "Contains test/mock/demo indicators"]);

        let report = FlawDetector::check("Remove duplicate loader", "Reality: 90% and it is a duplicate");
        assert_eq!(report.flaws, vec!["Marked as duplicate"]);
    }

    #[test]
    fn idea_gate_checks_reality_and_existing_proposal() {
        let mut conn = store::open_in_memory().expect("db");
        let weak = idea(&conn, 40);
        let decision = can_create_proposal_from_idea(&conn, weak).expect("gate");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Reality score too low (40% < 50%)");
        assert_eq!(can_create_proposal_from_idea(&conn, 999).expect("gate").reason, "Idea not found");

        let strong = idea(&conn, 96);
        let outcome = create_proposal_from_idea(&mut conn, strong, "ana", None).expect("create");
        let proposal_id = outcome.created_id.expect("created");
        let proposal = proposals::get(&conn, proposal_id).expect("get").expect("exists");
        assert_eq!(proposal.title, "Performance: Cache parsed configuration between runs");
        assert!(proposal.description.starts_with("Reality: 96%\nSource: Idea #"));
        assert_eq!(proposal.status, ProposalStatus::NeedsReview);
        assert_eq!((proposal.impact, proposal.effort), (Impact::High, Effort::Low));
        assert_eq!(proposal.idea_id, Some(strong));

        let again = create_proposal_from_idea(&mut conn, strong, "ana", None).expect("create");
        assert_eq!(again.decision.reason, "Already converted to proposal");
        assert_eq!(again.created_id, None);
    }

    #[test]
    fn submitted_proposal_is_blocked_until_approved() {
        let mut conn = store::open_in_memory().expect("db");
        let idea_id = idea(&conn, 90);
        let proposal_id = create_proposal_from_idea(&mut conn, idea_id, "ana", None)
            .expect("create")
            .created_id
            .expect("created");

        let blocked = convert_proposal_to_todo(&mut conn, proposal_id, None).expect("convert");
        assert!(!blocked.decision.allowed);
        assert!(blocked.decision.reason.contains("Review required"));

        review(&mut conn, proposal_id, ReviewDecision::Approve, "lead", "ship it").expect("review");
        let done = convert_proposal_to_todo(&mut conn, proposal_id, None).expect("convert");
        assert!(done.decision.allowed);
        let todo = todos::get(&conn, done.created_id.expect("todo")).expect("get").expect("exists");
        assert!(todo.description.starts_with(&format!("From Proposal #{proposal_id}")));
        assert_eq!(todo.proposal_id, Some(proposal_id));

        let twice = convert_proposal_to_todo(&mut conn, proposal_id, None).expect("convert");
        assert_eq!(twice.decision.reason, "Already converted to todo");
    }

    #[test]
    fn approved_proposal_without_discussion_is_blocked() {
        let mut conn = store::open_in_memory().expect("db");
        let id = proposals::submit(
            &conn,
            &NewProposal::new("Rotate backups weekly", "Source: ops review, keeps disk usage bounded"),
        )
        .expect("submit");
        review(&mut conn, id, ReviewDecision::Approve, "lead", "").expect("review");
        let decision = can_convert_proposal_to_todo(&conn, id).expect("gate");
        assert_eq!(decision.reason, "No discussion found. Discussion required!");

        collab::start(&conn, "Rotate backups weekly: details", "ana", None).expect("discussion");
        assert!(can_convert_proposal_to_todo(&conn, id).expect("gate").allowed);
    }

    #[test]
    fn force_bypasses_gate_and_leaves_audit_row() {
        let mut conn = store::open_in_memory().expect("db");
        let id = proposals::submit(&conn, &NewProposal::new("Tiny", "")).expect("submit");

        let outcome = convert_proposal_to_todo(&mut conn, id, Some(&admin())).expect("convert");
        assert!(outcome.created_id.is_some());
        assert_eq!(
            proposals::get(&conn, id).expect("get").expect("exists").status,
            ProposalStatus::Converted
        );
        let (actor, reason): (String, String) = conn
            .query_row(
                "SELECT actor, reason FROM workflow_overrides WHERE proposal_id = ?1 AND action = 'convert'",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("override row");
        assert_eq!((actor.as_str(), reason.as_str()), ("root", "hotfix"));
    }

    #[test]
    fn forced_idea_conversion_is_audited() {
        let mut conn = store::open_in_memory().expect("db");
        let weak = idea(&conn, 10);
        let outcome = create_proposal_from_idea(&mut conn, weak, "ana", Some(&admin())).expect("create");
        let proposal = proposals::get(&conn, outcome.created_id.expect("created")).expect("get").expect("exists");
        assert_eq!((proposal.impact, proposal.effort), (Impact::Low, Effort::High));
        let overrides: i64 = conn
            .query_row("SELECT COUNT(*) FROM workflow_overrides WHERE action = 'create'", [], |row| row.get(0))
            .expect("count");
        assert_eq!(overrides, 1);
    }

    #[test]
    fn review_decisions_map_to_status() {
        let mut conn = store::open_in_memory().expect("db");
        let id = proposals::submit(&conn, &NewProposal::new("Document the CLI", "Source: support"))
            .expect("submit");
        assert_eq!(
            review(&mut conn, id, "revise".parse().expect("decision"), "lead", "more detail").expect("review"),
            ProposalStatus::NeedsRevision
        );
        assert_eq!(
            review(&mut conn, id, ReviewDecision::Reject, "lead", "").expect("review"),
            ProposalStatus::Rejected
        );
        assert_eq!(proposals::reviews(&conn, id).expect("reviews").len(), 2);
        assert!("later".parse::<ReviewDecision>().is_err());
        assert!(review(&mut conn, 999, ReviewDecision::Approve, "lead", "").is_err());
    }

    #[test]
    fn discussion_title_match_treats_wildcards_literally() {
        let mut conn = store::open_in_memory().expect("db");
        let id = proposals::submit(
            &conn,
            &NewProposal::new("Cut_ci cost by 50% per run", "Source: billing report for the last quarter"),
        )
        .expect("submit");
        review(&mut conn, id, ReviewDecision::Approve, "lead", "").expect("review");

        collab::start(&conn, "Cut-ci cost by 500 per run", "ana", None).expect("discussion");
        let decision = can_convert_proposal_to_todo(&conn, id).expect("gate");
        assert_eq!(decision.reason, "No discussion found. Discussion required!");

        collab::start(&conn, "Re: Cut_ci cost by 50% per run", "ana", None).expect("discussion");
        assert!(can_convert_proposal_to_todo(&conn, id).expect("gate").allowed);
    }

    #[test]
    fn critical_impact_converts_to_urgent_todo() {
        let mut conn = store::open_in_memory().expect("db");
        let mut new = NewProposal::new("Patch token refresh race", "Source: incident review, sessions leak after expiry");
        new.impact = Impact::Critical;
        let id = proposals::submit(&conn, &new).expect("submit");
        review(&mut conn, id, ReviewDecision::Approve, "lead", "").expect("review");
        collab::start(&conn, "Patch token refresh race", "ana", None).expect("discussion");

        let outcome = convert_proposal_to_todo(&mut conn, id, None).expect("convert");
        let todo = todos::get(&conn, outcome.created_id.expect("todo")).expect("get").expect("exists");
        assert_eq!(todo.priority, Priority::Urgent);
    }

    #[test]
    fn converted_proposal_rejects_workflow_review() {
        let mut conn = store::open_in_memory().expect("db");
        let id = proposals::submit(&conn, &NewProposal::new("Tiny", "")).expect("submit");
        convert_proposal_to_todo(&mut conn, id, Some(&admin())).expect("convert");
        let err = review(&mut conn, id, ReviewDecision::Approve, "lead", "").expect_err("final");
        assert!(matches!(err, WsError::Transition { .. }));
    }

    #[test]
    fn todo_priority_for_idea_bands() {
        assert_eq!(todo_priority_for_idea("Fix login BUG", 50), Priority::Urgent);
        assert_eq!(todo_priority_for_idea("Harden security headers", 81), Priority::Urgent);
        assert_eq!(todo_priority_for_idea("Split loader", 95), Priority::High);
        assert_eq!(todo_priority_for_idea("Split loader", 85), Priority::Medium);
        assert_eq!(todo_priority_for_idea("Split loader", 84), Priority::Low);
    }

    #[test]
    fn populate_proposes_discusses_and_creates_todos_once() {
        let mut conn = store::open_in_memory().expect("db");
        let add = |conn: &Connection, title: &str, category: &str, reality: i64| {
            let mut new = NewIdea::manual(title);
            new.category = category.to_string();
            new.description = "Found while reading the request handlers".to_string();
            new.reality_score = reality;
            ideas::add(conn, &new).expect("idea")
        };
        add(&conn, "Fix security bug in token refresh handler", "todo", 96);
        add(&conn, "Split the config loader module", "todo", 90);
        add(&conn, "Retry wrapper around flaky network calls", "pattern", 85);
        add(&conn, "Rename everything", "todo", 70);
        add(&conn, "Memoize template lookups", "performance", 99);
        todos::add(
            &conn,
            &todos::NewTodo { title: "Split the config loader module into parts".to_string(), ..Default::default() },
        )
        .expect("todo");
        let lonely = proposals::submit(&conn, &NewProposal::new("Rotate backups weekly", "Source: ops"))
            .expect("submit");

        let report = populate(&mut conn, "system").expect("populate");
        assert_eq!(report.proposals.len(), 3);
        assert_eq!(report.discussions.len(), 1);
        assert_eq!(report.todos.len(), 1);
        assert_eq!(report.blocked, 0);

        let discussion_for: i64 = conn
            .query_row("SELECT proposal_id FROM discussions WHERE id = ?1", [report.discussions[0]], |row| row.get(0))
            .expect("discussion");
        assert_eq!(discussion_for, lonely);
        let todo = todos::get(&conn, report.todos[0]).expect("get").expect("exists");
        assert_eq!(todo.title, "Fix security bug in token refresh handler");
        assert_eq!(todo.priority, Priority::Urgent);

        let again = populate(&mut conn, "system").expect("populate again");
        assert!(again.proposals.is_empty() && again.discussions.is_empty() && again.todos.is_empty());
        assert_eq!(again.blocked, 3);
    }

    #[test]
    fn title_case_capitalises_words() {
        assert_eq!(title_case("code_quality"), "Code_Quality");
        assert_eq!(title_case("PERFORMANCE tuning"), "Performance Tuning");
    }
}
