//! Workspace growth snapshots

use anyhow::Result;
use clap::Subcommand;

use super::utils::print_json;
use super::Workspace;
use crate::evolution;
use crate::store;

#[derive(Subcommand)]
pub enum EvolutionCommand {
    /// Record the current metrics
    Snapshot {
        #[arg(default_value = "")]
        notes: String,
    },
    /// Show every snapshot and the growth between the first and the last
    Show {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cmd: EvolutionCommand, ws: &mut Workspace) -> Result<()> {
    match cmd {
        EvolutionCommand::Snapshot { notes } => {
            let snapshot = evolution::snapshot(&mut ws.conn, &notes, store::now())?;
            println!("✓ Snapshot {}", snapshot.captured_at);
            for (metric, value) in &snapshot.metrics {
                println!("  {metric:<20} {value}");
            }
        }
        EvolutionCommand::Show { json } => {
            let timeline = evolution::timeline(&ws.conn)?;
            if json {
                return print_json(&timeline);
            }
            let (Some(first), Some(last)) = (timeline.first(), timeline.last()) else {
                println!("No snapshots yet. Run `ws evolution snapshot` first.");
                return Ok(());
            };
            for snapshot in &timeline {
                let notes = if snapshot.notes.is_empty() { String::new() } else { format!(" ({})", snapshot.notes) };
                println!("{}{notes}", snapshot.captured_at);
                for (metric, value) in &snapshot.metrics {
                    println!("  {metric:<20} {value}");
                }
            }
            if timeline.len() > 1 {
                println!("\nGrowth since {}:", first.captured_at);
                for g in evolution::growth(first, last) {
                    println!("  {:<20} {:+} ({:+.1}%)", g.metric, g.change, g.percent);
                }
            }
        }
    }
    Ok(())
}
