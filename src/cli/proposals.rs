//! Proposal commands

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Workspace;
use crate::domain::{Effort, Impact, ProposalStatus, ReviewOutcome};
use crate::proposals::{self, NewProposal, Proposal};

#[derive(Args)]
pub struct ProposeArgs {
    /// Proposal title
    pub title: String,

    #[arg(short, long)]
    pub description: String,

    #[arg(long, default_value = "")]
    pub rationale: String,

    #[arg(long, default_value = "medium")]
    pub impact: Impact,

    #[arg(long, default_value = "medium")]
    pub effort: Effort,
}

#[derive(Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub proposal: ProposeArgs,

    #[arg(long, default_value = "improvement")]
    pub category: String,

    /// Submitting user (defaults to the configured user)
    #[arg(long)]
    pub by: Option<String>,
}

#[derive(Subcommand)]
pub enum ProposalCommand {
    /// Submit a proposal without validating it
    Submit(SubmitArgs),
    /// Record a review decision
    Review {
        id: i64,
        /// approved, rejected or needs_revision
        decision: ReviewOutcome,
        #[arg(long, default_value_t = 0)]
        score: i64,
        #[arg(long, default_value = "")]
        comments: String,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Score a proposal against the criteria and record the decision
    Validate { id: i64 },
    /// Turn an approved proposal into a todo
    Convert { id: i64 },
    /// List proposals, best scored first
    List {
        #[arg(long)]
        status: Option<ProposalStatus>,
    },
    /// Show one proposal with its reviews
    Show { id: i64 },
    /// List or add review criteria
    Criteria {
        /// Name of a criterion to add
        #[arg(long, requires = "weight")]
        add: Option<String>,
        #[arg(long)]
        weight: Option<i64>,
        #[arg(long, default_value = "")]
        description: String,
    },
}

fn new_proposal(args: ProposeArgs) -> NewProposal {
    NewProposal {
        rationale: args.rationale,
        impact: args.impact,
        effort: args.effort,
        ..NewProposal::new(&args.title, &args.description)
    }
}

fn print_line(p: &Proposal) {
    println!(
        "#{:<4} [{}] {} (score: {}, impact: {}, effort: {})",
        p.id, p.status, p.title, p.score, p.impact, p.effort
    );
}

/// Submit, auto-validate and, when approved, convert straight to a todo.
pub fn propose(args: ProposeArgs, ws: &mut Workspace) -> Result<()> {
    let mut proposal = new_proposal(args);
    proposal.submitted_by = ws.config.default_user.clone();
    let id = proposals::submit(&ws.conn, &proposal)?;
    println!("✓ Proposal #{id} submitted");

    let Some(validation) = proposals::validate_and_review(&mut ws.conn, id)? else {
        anyhow::bail!("Proposal #{} not found", id);
    };
    println!("✓ Validation: {} (score: {}%)", validation.decision.as_str().to_uppercase(), validation.score);
    if validation.decision != ReviewOutcome::Approved {
        println!("→ Needs revision. Improve and resubmit.");
        return Ok(());
    }
    if let Some(todo_id) = proposals::convert_to_todo(&mut ws.conn, id)? {
        println!("✓ Converted to todo #{todo_id}");
    }
    Ok(())
}

pub fn run(cmd: ProposalCommand, ws: &mut Workspace) -> Result<()> {
    match cmd {
        ProposalCommand::Submit(args) => {
            let mut proposal = new_proposal(args.proposal);
            proposal.category = args.category;
            proposal.submitted_by = args.by.unwrap_or_else(|| ws.config.default_user.clone());
            let id = proposals::submit(&ws.conn, &proposal)?;
            println!("✓ Proposal #{id} submitted");
        }
        ProposalCommand::Review { id, decision, score, comments, reviewer } => {
            let reviewer = reviewer.unwrap_or_else(|| ws.config.default_user.clone());
            proposals::review(&mut ws.conn, id, decision, &reviewer, score, &comments, None)?;
            println!("✓ Proposal #{id} → {decision}");
        }
        ProposalCommand::Validate { id } => match proposals::validate_and_review(&mut ws.conn, id)? {
            Some(v) => {
                println!("Decision: {} ({}%)", v.decision, v.score);
                for (name, score) in &v.criteria_scores {
                    println!("  {name:<12} {score:.1}");
                }
                println!("  total        {:.1} / {:.1}", v.total, v.max);
            }
            None => anyhow::bail!("Proposal #{} not found", id),
        },
        ProposalCommand::Convert { id } => match proposals::convert_to_todo(&mut ws.conn, id)? {
            Some(todo_id) => println!("✓ Proposal #{id} converted to todo #{todo_id}"),
            None => anyhow::bail!("Proposal #{} not found, not approved or already converted", id),
        },
        ProposalCommand::List { status } => {
            let list = proposals::list(&ws.conn, status)?;
            if list.is_empty() {
                println!("No proposals.");
            }
            list.iter().for_each(print_line);
        }
        ProposalCommand::Show { id } => {
            let Some(p) = proposals::get(&ws.conn, id)? else {
                anyhow::bail!("Proposal #{} not found", id);
            };
            print_line(&p);
            println!("Category:  {}", p.category);
            println!("Submitted: {} by {}", p.created_at, p.submitted_by);
            if let Some(idea) = p.idea_id {
                println!("From idea: #{idea}");
            }
            println!("\n{}", p.description);
            if !p.rationale.is_empty() {
                println!("\nRationale: {}", p.rationale);
            }
            let reviews = proposals::reviews(&ws.conn, id)?;
            if !reviews.is_empty() {
                println!("\nReviews:");
                for r in reviews {
                    let score = r.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
                    println!("  {} {} → {} ({}) {}", r.created_at, r.reviewer, r.decision, score, r.comments);
                }
            }
        }
        ProposalCommand::Criteria { add, weight, description } => {
            if let (Some(name), Some(weight)) = (add, weight) {
                match proposals::add_criterion(&ws.conn, &name, &description, weight)? {
                    Some(_) => println!("✓ Criterion '{name}' added"),
                    None => println!("Criterion '{name}' already exists"),
                }
            }
            for c in proposals::list_criteria(&ws.conn)? {
                println!("{:<12} weight {}  {}", c.name, c.weight, c.description);
            }
        }
    }
    Ok(())
}
