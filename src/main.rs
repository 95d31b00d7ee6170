//! ws: workspace management CLI
//!
//! Tracks ideas, proposals, todos, wiki pages, tools and quality metrics in
//! one shared SQLite database.

use anyhow::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    ws_toolkit::cli::run()
}
