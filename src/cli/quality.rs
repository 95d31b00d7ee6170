//! Quality, health and automated report commands

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};

use super::utils::print_json;
use super::Workspace;
use crate::automation::{self, Conclusion};
use crate::quality::{self, GateRule, RuleStatus};
use crate::{health, store};

#[derive(Subcommand)]
pub enum QualityCommand {
    /// Quality metrics
    #[command(subcommand)]
    Metric(MetricCommand),
    /// Quality gates
    #[command(subcommand)]
    Gate(GateCommand),
    /// Score the workspace (`system`) or a single tool
    Assess {
        #[arg(default_value = "system")]
        kind: String,
        /// Tool name for `tool` assessments
        #[arg(default_value = "workspace")]
        target: String,
    },
    /// Unresolved alerts (or resolved ones with --resolved)
    Alerts {
        #[arg(long)]
        resolved: bool,
    },
    /// Resolve an alert
    Resolve { id: i64 },
}

#[derive(Subcommand)]
pub enum MetricCommand {
    /// Record a value; raises an alert when the metric is degrading
    Record {
        component: String,
        metric: String,
        value: f64,
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
    },
    /// Direction of a metric over the last HOURS
    Trend {
        component: String,
        metric: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[derive(Subcommand)]
pub enum GateCommand {
    /// Create a gate from a JSON array of rules
    ///
    /// e.g. '[{"type":"metric","component":"api","metric":"coverage","threshold":80}]'
    Create {
        name: String,
        rules: String,
        #[arg(long, default_value = "custom")]
        kind: String,
    },
    List,
    /// Evaluate a gate (exit status 1 when it fails)
    Run {
        name: String,
        #[arg(long)]
        context: Option<String>,
    },
}

#[derive(Args)]
pub struct HealthArgs {
    /// Show recorded checks from the last HOURS instead of running one
    #[arg(long, value_name = "HOURS")]
    pub history: Option<i64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub action: Option<ReportAction>,
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Current state of the workspace
    Review,
    /// Trends over recent history
    Study,
    /// Findings and action items from a fresh review and study
    Conclude,
    /// Review, study and conclude, then store the report
    Full {
        #[arg(long, default_value = "daily")]
        period: String,
    },
    /// Seed the recurring report jobs
    Schedule,
    /// Stored reports
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

pub fn run(cmd: QualityCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        QualityCommand::Metric(MetricCommand::Record { component, metric, value, threshold }) => {
            let id = quality::record_metric(conn, &component, &metric, value, threshold)?;
            println!("✓ Metric #{id} recorded: {component}.{metric} = {value}");
            if let Some(alert) = quality::check_degradation(conn, &component, &metric, value, threshold)? {
                println!("⚠ Alert #{alert}: {component}.{metric} is degrading");
            }
        }
        QualityCommand::Metric(MetricCommand::Trend { component, metric, hours }) => {
            let trend = quality::metric_trend(conn, &component, &metric, hours)?;
            println!("{component}.{metric}: {trend} (last {hours}h)");
        }
        QualityCommand::Gate(GateCommand::Create { name, rules, kind }) => {
            let rules: Vec<GateRule> =
                serde_json::from_str(&rules).with_context(|| format!("Invalid gate rules: {rules}"))?;
            match quality::create_gate(conn, &name, &kind, &rules)? {
                Some(id) => println!("✓ Gate #{id} '{name}' created with {} rules", rules.len()),
                None => anyhow::bail!("Gate '{}' already exists", name),
            }
        }
        QualityCommand::Gate(GateCommand::List) => {
            for gate in quality::list_gates(conn)? {
                let state = if gate.active { "active" } else { "inactive" };
                println!("{:<20} [{}] {} rules ({})", gate.name, gate.kind, gate.rules.len(), state);
            }
        }
        QualityCommand::Gate(GateCommand::Run { name, context }) => {
            let Some(result) = quality::execute_gate(conn, &name, context.as_deref())? else {
                anyhow::bail!("No active gate named '{}'", name);
            };
            for detail in &result.details {
                let mark = match detail.status {
                    RuleStatus::Pass => "✓",
                    RuleStatus::Fail => "✗",
                    RuleStatus::NoData => "?",
                };
                let value = detail.value.map(|v| format!("{v:.1}")).unwrap_or_else(|| "no data".into());
                println!("  {mark} {} ({value})", serde_json::to_string(&detail.rule)?);
            }
            if !result.passed {
                anyhow::bail!("Gate '{}' failed ({}/{} rules passed)", name, result.passed_rules, result.details.len());
            }
            println!("✓ Gate '{name}' passed");
        }
        QualityCommand::Assess { kind, target } => {
            let a = quality::run_assessment(conn, &kind, &target)?;
            println!("Assessment #{} of {} '{}'", a.id, a.kind, a.target);
            println!("Score: {}/100 (Grade: {})", a.score, a.grade.letter());
            for f in &a.findings {
                println!("  - {f}");
            }
            for r in &a.recommendations {
                println!("  → {r}");
            }
        }
        QualityCommand::Alerts { resolved } => {
            let list = quality::alerts(conn, resolved)?;
            if list.is_empty() {
                println!("No alerts.");
            }
            for a in list {
                println!("#{:<4} [{}] {}", a.id, a.severity, a.message);
            }
        }
        QualityCommand::Resolve { id } => {
            if !quality::resolve_alert(conn, id)? {
                anyhow::bail!("No unresolved alert #{}", id);
            }
            println!("✓ Alert #{id} resolved");
        }
    }
    Ok(())
}

pub fn health(args: HealthArgs, ws: &Workspace) -> Result<()> {
    if let Some(hours) = args.history {
        let history = health::health_history(&ws.conn, hours)?;
        if args.json {
            return print_json(&history);
        }
        if history.is_empty() {
            println!("No health checks in the last {hours}h.");
        }
        for h in history {
            println!("{} {:<9} issues: {}", h.checked_at, h.status, h.data.issues.len());
        }
        return Ok(());
    }

    let report = health::check_health(&ws.conn, &ws.config.db_path)?;
    if args.json {
        return print_json(&report);
    }
    let d = &report.data;
    println!("HEALTH: {}", report.status.as_str().to_uppercase());
    println!("Database:  {:.2} MB", d.db_size as f64 / (1024.0 * 1024.0));
    println!("Tools:     {} active", d.tools_active);
    println!("Quality:   {}", d.quality_grade.map(String::from).unwrap_or_else(|| "not assessed".into()));
    println!("Alerts:    {} unresolved", d.alerts);
    for issue in &d.issues {
        println!("  ⚠ {issue}");
    }
    Ok(())
}

fn print_conclusion(c: &Conclusion) {
    println!("Overall: {}", c.overall_status.as_str().to_uppercase());
    for f in &c.findings {
        println!("  - {f}");
    }
    if !c.recommendations.is_empty() {
        println!("Recommendations:");
        for r in &c.recommendations {
            println!("  → {r}");
        }
    }
    if !c.action_items.is_empty() {
        println!("Action items:");
        for a in &c.action_items {
            println!("  • {a}");
        }
    }
}

pub fn report(args: ReportArgs, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match args.action.unwrap_or(ReportAction::Full { period: "daily".to_string() }) {
        ReportAction::Review => print_json(&automation::auto_review(conn))?,
        ReportAction::Study => print_json(&automation::auto_study(conn))?,
        ReportAction::Conclude => {
            let review = automation::auto_review(conn);
            let study = automation::auto_study(conn);
            print_conclusion(&automation::auto_conclude(&review, &study));
        }
        ReportAction::Full { period } => {
            let report = automation::generate_report(conn, &period)?;
            println!("Report #{} ({}) {}", report.id, report.period, report.generated_at);
            println!("{}\n", report.summary());
            print_conclusion(&report.conclusion);
        }
        ReportAction::Schedule => {
            let seeded = automation::schedule_automated_tasks(conn, store::now())?;
            if seeded.is_empty() {
                println!("Report jobs already scheduled.");
            }
            for task in seeded {
                println!("✓ Scheduled {task}");
            }
        }
        ReportAction::List { limit } => {
            for r in automation::list_reports(conn, limit)? {
                println!("#{:<4} {} [{} {}] {}", r.id, r.created_at, r.report_type, r.period, r.summary);
            }
        }
    }
    Ok(())
}
