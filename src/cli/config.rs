//! Show the effective configuration

use anyhow::{Context, Result};
use clap::Args;

use crate::config::WorkspaceConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Print as YAML instead of TOML
    #[arg(long)]
    pub yaml: bool,
}

pub fn run(args: ConfigArgs, config: &WorkspaceConfig) -> Result<()> {
    let rendered = if args.yaml {
        serde_yaml::to_string(config).context("Failed to render configuration as YAML")?
    } else {
        toml::to_string_pretty(config).context("Failed to render configuration as TOML")?
    };
    print!("{rendered}");
    Ok(())
}
