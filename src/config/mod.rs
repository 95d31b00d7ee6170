//! Workspace configuration.
//!
//! Settings come from defaults, an optional TOML/YAML file, `WS_*` environment
//! variables and finally CLI flags (CLI > Env > File > Defaults).

pub mod loader;

pub use loader::load_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A markdown file imported into the wiki under `title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMapping {
    pub file: PathBuf,
    pub title: String,
}

impl DocMapping {
    fn new(file: &str, title: &str) -> Self {
        Self { file: PathBuf::from(file), title: title.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// SQLite database shared by every command.
    pub db_path: PathBuf,
    /// Directory holding timestamped database copies.
    pub backup_dir: PathBuf,
    /// Base directory for `wiki_docs` paths.
    pub docs_root: PathBuf,
    pub wiki_docs: Vec<DocMapping>,
    pub task_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub dedup_threshold: f64,
    pub min_idea_reality: i64,
    pub default_user: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("workspace_knowledge.db"),
            backup_dir: PathBuf::from("backups"),
            docs_root: PathBuf::from("."),
            wiki_docs: vec![
                DocMapping::new("README.md", "Quick Start"),
                DocMapping::new("SETUP.md", "Installation Guide"),
                DocMapping::new("TESTING.md", "Testing Framework"),
                DocMapping::new("STRUCTURE.md", "Project Structure"),
                DocMapping::new("ARCHITECTURE_OVERVIEW.txt", "System Architecture"),
                DocMapping::new("INDEX.md", "Documentation Index"),
            ],
            task_timeout_secs: 300,
            tool_timeout_secs: 30,
            dedup_threshold: 0.8,
            min_idea_reality: 50,
            default_user: "user".to_string(),
        }
    }
}
