//! Idea commands

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use super::Workspace;
use crate::domain::Priority;
use crate::ideas::{self, NewIdea};

#[derive(Subcommand)]
pub enum IdeaCommand {
    /// Extract ideas from the Python sources and READMEs under PATH
    Scan {
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
    },
    /// Add an idea by hand
    Add {
        title: String,
        #[arg(long, default_value = "general")]
        category: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
    },
    /// List ideas, most realistic first
    List {
        #[arg(long)]
        category: Option<String>,
        /// Hide ideas scoring below this reality score
        #[arg(long, default_value_t = 0)]
        min_reality: i64,
    },
    /// Mark an idea as reviewed
    Review { id: i64 },
    /// Estimate an idea's value and suggested priority
    Value { id: i64 },
}

pub fn run(cmd: IdeaCommand, ws: &mut Workspace) -> Result<()> {
    match cmd {
        IdeaCommand::Scan { path } => {
            let root = path.canonicalize().with_context(|| format!("Cannot scan {}", path.display()))?;
            let summary = ideas::scan(&mut ws.conn, &root)?;
            println!("Scanned {}", root.display());
            println!("  Found:   {}", summary.found);
            println!("  High:    {}", summary.high);
            println!("  Medium:  {}", summary.medium);
            println!("  Low:     {} (skipped)", summary.low);
            println!("✓ Stored {} ideas", summary.added);
        }
        IdeaCommand::Add { title, category, description, priority } => {
            let idea = NewIdea { category, description, priority, ..NewIdea::manual(&title) };
            let id = ideas::add(&ws.conn, &idea)?;
            println!("✓ Idea #{id} added");
        }
        IdeaCommand::List { category, min_reality } => {
            let list = ideas::list(&ws.conn, category.as_deref(), min_reality)?;
            if list.is_empty() {
                println!("No ideas.");
            }
            for idea in list {
                println!(
                    "#{:<4} [{:>3}%] [{}] {} ({})",
                    idea.id, idea.reality_score, idea.category, idea.title, idea.status
                );
                if !idea.warnings.is_empty() {
                    println!("        {}", idea.warnings);
                }
            }
        }
        IdeaCommand::Value { id } => {
            let Some(idea) = ideas::get(&ws.conn, id)? else {
                anyhow::bail!("Idea #{} not found", id);
            };
            let analysis = ideas::analyze_value(&idea.title, &idea.description);
            println!("#{} {}", idea.id, idea.title);
            println!("  Value:    {}/100", analysis.value_score);
            println!("  Priority: {}", analysis.priority);
            println!("  Next:     {}", analysis.path.as_str());
            for step in analysis.path.steps() {
                println!("    - {step}");
            }
        }
        IdeaCommand::Review { id } => {
            if ideas::mark_reviewed(&ws.conn, id)? {
                println!("✓ Idea #{id} reviewed");
            } else {
                anyhow::bail!("Idea #{} not found", id);
            }
        }
    }
    Ok(())
}
