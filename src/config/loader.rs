//! Config file discovery and layering

use super::WorkspaceConfig;
use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use figment::Figment;
use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 6] = ["ws.toml", ".ws.toml", "ws.yml", ".ws.yml", "ws.yaml", ".ws.yaml"];

/// Load configuration for a workspace rooted at `root`.
///
/// An explicit `config_path` must parse. An auto-discovered file that fails
/// to parse is skipped with a warning and defaults plus environment apply.
pub fn load_config(root: &Path, config_path: Option<&Path>) -> Result<WorkspaceConfig> {
    let explicit = config_path.is_some();
    let file = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(root),
    };

    let Some(file) = file else {
        return extract(base());
    };

    if explicit && !file.exists() {
        anyhow::bail!("Config file not found: {}", file.display());
    }

    let layered = match with_file(base(), &file) {
        Ok(figment) => extract(figment),
        Err(e) => Err(e),
    };
    match layered {
        Ok(cfg) => Ok(cfg),
        Err(e) if explicit => Err(e),
        Err(e) => {
            tracing::warn!(
                "Failed to parse auto-discovered config {}: {:#}",
                file.display(),
                e
            );
            extract(base())
        }
    }
}

fn base() -> Figment {
    Figment::from(Serialized::defaults(WorkspaceConfig::default()))
}

fn with_file(figment: Figment, file: &Path) -> Result<Figment> {
    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let figment = match ext.as_str() {
        "toml" => figment.merge(Toml::file(file)),
        "yaml" | "yml" => figment.merge(Yaml::file(file)),
        other => {
            anyhow::bail!("Unsupported config extension '.{}' for file {}", other, file.display())
        }
    };
    Ok(figment)
}

fn extract(figment: Figment) -> Result<WorkspaceConfig> {
    figment
        .merge(Env::prefixed("WS_"))
        .extract()
        .context("Invalid workspace configuration")
}

fn discover_config(root: &Path) -> Option<PathBuf> {
    CANDIDATES.iter().map(|c| root.join(c)).find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_file() {
        let tmp = TempDir::new().expect("tmp");
        let cfg = load_config(tmp.path(), None).expect("config");
        assert_eq!(cfg.task_timeout_secs, 300);
        assert_eq!(cfg.tool_timeout_secs, 30);
        assert!((cfg.dedup_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn printed_config_loads_back_unchanged() {
        let tmp = TempDir::new().expect("tmp");
        let mut original = WorkspaceConfig::default();
        original.default_user = "robin".to_string();
        original.wiki_docs.truncate(2);
        fs::write(tmp.path().join("ws.toml"), toml::to_string_pretty(&original).expect("render"))
            .expect("write");

        let cfg = load_config(tmp.path(), None).expect("config");
        similar_asserts::assert_eq!(cfg, original);
    }

    #[test]
    fn discovers_toml_file() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("ws.toml"), "backup_dir = 'snapshots'\ntask_timeout_secs = 5\n")
            .expect("write");

        let cfg = load_config(tmp.path(), None).expect("config");
        assert_eq!(cfg.backup_dir, PathBuf::from("snapshots"));
        assert_eq!(cfg.task_timeout_secs, 5);
        assert_eq!(cfg.tool_timeout_secs, 30);
    }

    #[test]
    fn explicit_yaml_with_doc_mappings() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("custom.yaml");
        fs::write(
            &path,
            "wiki_docs:\n  - file: docs/intro.md\n    title: Intro\ndefault_user: sam\n",
        )
        .expect("write");

        let cfg = load_config(tmp.path(), Some(&path)).expect("config");
        assert_eq!(cfg.wiki_docs.len(), 1);
        assert_eq!(cfg.wiki_docs[0].title, "Intro");
        assert_eq!(cfg.default_user, "sam");
    }

    #[test]
    fn explicit_config_with_bad_type_is_error() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "task_timeout_secs = 'soon'\n").expect("write");

        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }

    #[test]
    fn explicit_config_with_unknown_extension_is_error() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("ws.ini");
        fs::write(&path, "x=1\n").expect("write");

        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }

    #[test]
    fn broken_auto_discovered_config_falls_back_to_defaults() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("ws.toml"), "task_timeout_secs = [1, 2]\n").expect("write");

        let cfg = load_config(tmp.path(), None).expect("soft-fail on auto-discovery");
        assert_eq!(cfg.task_timeout_secs, WorkspaceConfig::default().task_timeout_secs);
    }
}
