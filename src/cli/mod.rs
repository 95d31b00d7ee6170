//! Command-line interface for ws
//!
//! One subcommand group per file. Every command except `config` runs
//! against a single store opened here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{load_config, WorkspaceConfig};
use crate::store;

mod backup;
mod collab;
mod config;
mod dedup;
mod evolution;
mod ideas;
mod maintenance;
mod proposals;
mod quality;
mod sessions;
mod status;
mod todos;
mod tools;
mod utils;
mod wiki;
mod workflow;

/// Workspace management toolkit
#[derive(Parser)]
#[command(name = "ws")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace database (overrides config and WS_DB_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Configuration file (TOML or YAML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Overview of todos, proposals, wiki and tools
    Status,
    /// Register a user, resume their session and discover tools
    Init(status::InitArgs),
    /// Submit a proposal
    Propose(proposals::ProposeArgs),
    /// Manage todos (lists open todos by priority without a subcommand)
    Todo(todos::TodoArgs),
    /// Extract and manage ideas
    #[command(subcommand)]
    Idea(ideas::IdeaCommand),
    /// Review, validate and convert proposals
    #[command(subcommand)]
    Proposal(proposals::ProposalCommand),
    /// Gated idea → proposal → todo workflow
    #[command(subcommand)]
    Workflow(workflow::WorkflowCommand),
    /// Wiki pages
    #[command(subcommand)]
    Wiki(wiki::WikiCommand),
    /// Knowledge base
    #[command(subcommand)]
    Kb(wiki::KbCommand),
    /// Project milestones
    #[command(subcommand)]
    Progress(todos::ProgressCommand),
    /// Users and roles
    #[command(subcommand)]
    User(collab::UserCommand),
    /// Discussions and comments
    #[command(subcommand)]
    Discuss(collab::DiscussCommand),
    /// Work assignments
    #[command(subcommand)]
    Assign(collab::AssignCommand),
    /// Notifications
    #[command(subcommand)]
    Notify(collab::NotifyCommand),
    /// Work sessions, messages and session state
    #[command(subcommand)]
    Session(sessions::SessionCommand),
    /// Tool registry and execution
    #[command(subcommand)]
    Tool(tools::ToolCommand),
    /// Quality metrics, gates, assessments and alerts
    #[command(subcommand)]
    Quality(quality::QualityCommand),
    /// Scheduled maintenance tasks
    #[command(subcommand)]
    Task(maintenance::TaskCommand),
    /// Run due maintenance tasks (same as `task run`)
    Maintain,
    /// Capability registry
    #[command(subcommand)]
    Cap(maintenance::CapCommand),
    /// Workspace complexity score
    Complexity(maintenance::ComplexityArgs),
    /// Resource utilization
    #[command(subcommand)]
    Util(maintenance::UtilCommand),
    /// Database backups
    #[command(subcommand)]
    Backup(backup::BackupCommand),
    /// Git tag snapshots of a project
    #[command(subcommand)]
    GitBackup(backup::GitBackupCommand),
    /// Workspace health check
    Health(quality::HealthArgs),
    /// Automated review, study and reports
    Report(quality::ReportArgs),
    /// Check a title for near-duplicates (exit code 1 when found)
    Dedup(dedup::DedupArgs),
    /// Metric snapshots over time
    #[command(subcommand)]
    Evolution(evolution::EvolutionCommand),
    /// Search ideas, proposals, todos, wiki and knowledge
    Search(status::SearchArgs),
    /// Quick workspace check: health, quality and alerts
    Check,
    /// Show the effective configuration
    Config(config::ConfigArgs),
}

/// Open store plus the configuration it was opened with.
pub struct Workspace {
    pub conn: Connection,
    pub config: WorkspaceConfig,
}

impl Workspace {
    fn open(config: WorkspaceConfig) -> Result<Self> {
        let conn = store::open(&config.db_path)
            .with_context(|| format!("Failed to open workspace database {}", config.db_path.display()))?;
        Ok(Self { conn, config })
    }
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mut cfg = load_config(&cwd, cli.config.as_deref())?;
    if let Some(db) = cli.db {
        cfg.db_path = db;
    }

    match cli.command {
        Commands::Config(args) => {
            config::run(args, &cfg)?;
            Ok(ExitCode::SUCCESS)
        }
        command => dispatch(command, Workspace::open(cfg)?),
    }
}

fn dispatch(command: Commands, mut ws: Workspace) -> Result<ExitCode> {
    match command {
        Commands::Status => status::status(&ws)?,
        Commands::Init(args) => status::init(args, &ws)?,
        Commands::Propose(args) => proposals::propose(args, &mut ws)?,
        Commands::Todo(args) => todos::run(args, &ws)?,
        Commands::Idea(cmd) => ideas::run(cmd, &mut ws)?,
        Commands::Proposal(cmd) => proposals::run(cmd, &mut ws)?,
        Commands::Workflow(cmd) => workflow::run(cmd, &mut ws)?,
        Commands::Wiki(cmd) => wiki::run(cmd, &mut ws)?,
        Commands::Kb(cmd) => wiki::run_kb(cmd, &ws)?,
        Commands::Progress(cmd) => todos::run_progress(cmd, &ws)?,
        Commands::User(cmd) => collab::run_user(cmd, &ws)?,
        Commands::Discuss(cmd) => collab::run_discuss(cmd, &mut ws)?,
        Commands::Assign(cmd) => collab::run_assign(cmd, &ws)?,
        Commands::Notify(cmd) => collab::run_notify(cmd, &ws)?,
        Commands::Session(cmd) => sessions::run(cmd, &ws)?,
        Commands::Tool(cmd) => tools::run(cmd, &mut ws)?,
        Commands::Quality(cmd) => quality::run(cmd, &ws)?,
        Commands::Task(cmd) => maintenance::run_task(cmd, &mut ws)?,
        Commands::Maintain => maintenance::run_task(maintenance::TaskCommand::Run, &mut ws)?,
        Commands::Cap(cmd) => maintenance::run_cap(cmd, &ws)?,
        Commands::Complexity(args) => maintenance::run_complexity(args, &ws)?,
        Commands::Util(cmd) => maintenance::run_util(cmd, &ws)?,
        Commands::Backup(cmd) => backup::run(cmd, ws)?,
        Commands::GitBackup(cmd) => backup::run_git(cmd)?,
        Commands::Health(args) => quality::health(args, &ws)?,
        Commands::Report(args) => quality::report(args, &ws)?,
        Commands::Dedup(args) => return dedup::run(args, &ws),
        Commands::Evolution(cmd) => evolution::run(cmd, &mut ws)?,
        Commands::Search(args) => status::search(args, &ws)?,
        Commands::Check => status::check(&ws)?,
        Commands::Config(args) => config::run(args, &ws.config)?,
    }
    Ok(ExitCode::SUCCESS)
}
