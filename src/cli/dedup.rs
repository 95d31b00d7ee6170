//! Duplicate check for a proposed title

use anyhow::Result;
use clap::Args;
use std::process::ExitCode;

use super::Workspace;
use crate::dedup;

#[derive(Args)]
pub struct DedupArgs {
    /// Title to check
    pub title: String,

    /// Similarity ratio (0-1) at which titles count as duplicates
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Exit code 1 when any duplicate was found.
pub fn run(args: DedupArgs, ws: &Workspace) -> Result<ExitCode> {
    let threshold = args.threshold.unwrap_or(ws.config.dedup_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("Threshold must be between 0 and 1, got {}", threshold);
    }
    let report = dedup::find_duplicates(&ws.conn, &args.title, threshold);

    for source in &report.skipped {
        eprintln!("⚠ Could not check {source}");
    }
    if report.matches.is_empty() {
        println!("✓ No duplicates found for \"{}\"", args.title);
        return Ok(ExitCode::SUCCESS);
    }

    println!("⚠ {} possible duplicates of \"{}\":", report.matches.len(), args.title);
    for m in &report.matches {
        println!("  {:>3.0}%  {} #{}: {}", m.score * 100.0, m.source, m.id, m.title);
    }
    Ok(ExitCode::from(1))
}
