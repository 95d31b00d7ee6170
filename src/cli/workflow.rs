//! Gated idea → proposal → todo workflow commands

use anyhow::Result;
use clap::Subcommand;

use super::Workspace;
use crate::evolution;
use crate::wiki;
use crate::workflow::{self, GateDecision, Override, ReviewDecision, StepOutcome};

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Turn an idea into a proposal awaiting review
    IdeaToProposal {
        idea_id: i64,
        /// Skip the gate (recorded with --reason)
        #[arg(long, requires = "reason")]
        force: bool,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Turn an approved proposal into a todo
    ProposalToTodo {
        id: i64,
        /// Skip the gate (recorded with --reason)
        #[arg(long, requires = "reason")]
        force: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Approve, reject or send a proposal back for revision
    Review {
        id: i64,
        /// approve, reject or revise
        decision: ReviewDecision,
        #[arg(long, default_value = "")]
        feedback: String,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Show whether an idea may become a proposal
    CheckIdea { id: i64 },
    /// Show whether a proposal may become a todo
    CheckProposal { id: i64 },
    /// Batch pass: propose high-value ideas, open missing discussions, add todos
    Populate {
        /// Also import the configured docs into the wiki
        #[arg(long)]
        wiki: bool,
        #[arg(long)]
        actor: Option<String>,
    },
}

fn print_decision(decision: &GateDecision) {
    if decision.allowed {
        println!("✓ Allowed");
    } else {
        println!("✗ Blocked: {}", decision.reason);
    }
    for warning in &decision.warnings {
        println!("  ⚠ {warning}");
    }
}

fn print_outcome(outcome: &StepOutcome, created: &str) -> Result<()> {
    match outcome.created_id {
        Some(id) => {
            println!("✓ Created {created} #{id}");
            for warning in &outcome.decision.warnings {
                println!("  ⚠ {warning}");
            }
            Ok(())
        }
        None => {
            print_decision(&outcome.decision);
            anyhow::bail!("{}", outcome.decision.reason)
        }
    }
}

fn override_for(force: bool, reason: Option<String>, actor: &str) -> Option<Override> {
    force.then(|| Override { actor: actor.to_string(), reason: reason.unwrap_or_default() })
}

pub fn run(cmd: WorkflowCommand, ws: &mut Workspace) -> Result<()> {
    match cmd {
        WorkflowCommand::IdeaToProposal { idea_id, force, reason, actor } => {
            let actor = actor.unwrap_or_else(|| ws.config.default_user.clone());
            let forced = override_for(force, reason, &actor);
            let outcome = workflow::create_proposal_from_idea(&mut ws.conn, idea_id, &actor, forced.as_ref())?;
            print_outcome(&outcome, "proposal")?;
        }
        WorkflowCommand::ProposalToTodo { id, force, reason } => {
            let forced = override_for(force, reason, &ws.config.default_user);
            let outcome = workflow::convert_proposal_to_todo(&mut ws.conn, id, forced.as_ref())?;
            print_outcome(&outcome, "todo")?;
        }
        WorkflowCommand::Review { id, decision, feedback, reviewer } => {
            let reviewer = reviewer.unwrap_or_else(|| ws.config.default_user.clone());
            let status = workflow::review(&mut ws.conn, id, decision, &reviewer, &feedback)?;
            println!("✓ Proposal #{id} → {status}");
        }
        WorkflowCommand::CheckIdea { id } => {
            print_decision(&workflow::can_create_proposal_from_idea(&ws.conn, id)?);
        }
        WorkflowCommand::CheckProposal { id } => {
            print_decision(&workflow::can_convert_proposal_to_todo(&ws.conn, id)?);
        }
        WorkflowCommand::Populate { wiki, actor } => populate(ws, wiki, actor)?,
    }
    Ok(())
}

fn populate(ws: &mut Workspace, with_wiki: bool, actor: Option<String>) -> Result<()> {
    let actor = actor.unwrap_or_else(|| ws.config.default_user.clone());
    let report = workflow::populate(&mut ws.conn, &actor)?;
    println!("✓ {} proposals created ({} ideas blocked by the gate)", report.proposals.len(), report.blocked);
    println!("✓ {} discussions opened", report.discussions.len());
    println!("✓ {} todos created", report.todos.len());

    if with_wiki {
        let pages = wiki::populate(&mut ws.conn, &ws.config.docs_root, &ws.config.wiki_docs)?;
        println!("✓ Wiki: {} added, {} updated, {} missing", pages.added.len(), pages.updated.len(), pages.missing.len());
    }

    let growth = evolution::review_growth(&ws.conn)?;
    println!("\nWorkspace now holds:");
    for (table, count) in &growth.counts {
        println!("  {table:<12} {count}");
    }
    if !growth.proposals_by_status.is_empty() {
        println!("\nProposals by status:");
        for (status, count) in &growth.proposals_by_status {
            println!("  {status:<15} {count}");
        }
    }
    if !growth.todos_by_priority.is_empty() {
        println!("\nTodos by priority:");
        for (priority, count) in &growth.todos_by_priority {
            println!("  {priority:<8} {count}");
        }
    }
    Ok(())
}
