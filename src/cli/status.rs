//! Workspace-wide commands: status dashboard, init, check and search

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::Workspace;
use crate::domain::{Priority, ProposalStatus, TodoStatus, ToolStatus};
use crate::error::{Reading, WsError};
use crate::maintenance::capabilities;
use crate::{collab, ideas, knowledge, proposals, quality, sessions, todos, tools, wiki};

const SEARCH_SHOWN: usize = 3;
const HIGH_UTILIZATION: f64 = 80.0;
const CHECK_GATE: &str = "pre-commit";

#[derive(Args)]
pub struct InitArgs {
    /// Username to set up
    pub user: String,

    /// Role for a new user
    #[arg(long, default_value = "contributor")]
    pub role: String,

    /// Register scripts found in this directory as tools
    #[arg(long, value_name = "DIR", default_value = "tools")]
    pub tools_dir: PathBuf,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Text to look for
    pub query: String,
}

pub fn status(ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    let complexity = Reading::capture("complexity", || capabilities::complexity_score(conn).map(Some));
    let todo_counts = Reading::capture("todos", || {
        let open: Vec<_> = todos::list(conn, None, None)?
            .into_iter()
            .filter(|t| t.status != TodoStatus::Done)
            .collect();
        let urgent = open.iter().filter(|t| t.priority == Priority::Urgent).count();
        let high = open.iter().filter(|t| t.priority == Priority::High).count();
        Ok(Some((open.len(), urgent, high)))
    });
    let proposal_counts = Reading::capture("proposals", || {
        let total = proposals::list(conn, None)?.len();
        let pending = proposals::count_by_status(conn, ProposalStatus::Submitted)?;
        Ok(Some((total, pending)))
    });
    let alerts = Reading::capture("alerts", || quality::unresolved_alert_count(conn).map(Some));
    let active_tools =
        Reading::capture("tools", || Ok(Some(tools::list(conn, None, Some(ToolStatus::Active))?.len())));
    let wiki_pages = Reading::capture("wiki", || Ok(Some(wiki::stats(conn)?.pages)));
    let busy = Reading::capture("utilization", || {
        let summary = capabilities::utilization_summary(conn)?;
        if summary.is_empty() {
            return Ok(None);
        }
        Ok(Some(summary.iter().filter(|u| u.percent > HIGH_UTILIZATION).count()))
    });

    println!("WORKSPACE STATUS");
    println!("{}", "=".repeat(60));
    println!(
        "Complexity:  {}",
        complexity.render(|c| format!(
            "{} ({}), {} capabilities, {} tools",
            c.score,
            c.level.as_str().to_uppercase(),
            c.capabilities,
            c.tools
        ))
    );
    println!(
        "Todos:       {}",
        todo_counts.render(|(total, urgent, high)| format!("{total} open ({urgent} urgent, {high} high)"))
    );
    println!(
        "Proposals:   {}",
        proposal_counts.render(|(total, pending)| format!("{total} total ({pending} pending review)"))
    );
    println!("Alerts:      {}", alerts.render(|n| format!("{n} unresolved")));
    println!("Tools:       {}", active_tools.render(|n| format!("{n} active")));
    println!("Wiki:        {}", wiki_pages.render(|n| format!("{n} pages")));
    println!("Utilization: {}", busy.render(|n| format!("{n} resources above {HIGH_UTILIZATION}%")));
    Ok(())
}

pub fn init(args: InitArgs, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    println!("Initializing workspace for {}...", args.user);

    match collab::add_user(conn, &args.user, &args.role, None)? {
        Some(_) => println!("✓ User '{}' created ({})", args.user, args.role),
        None => println!("✓ User '{}' exists", args.user),
    }

    let (session_id, is_new) = sessions::resume(conn, &args.user)?;
    if is_new {
        println!("✓ Session #{session_id} started");
    } else {
        println!("✓ Session #{session_id} resumed");
    }

    if args.tools_dir.is_dir() {
        let found = tools::discover(conn, &args.tools_dir)?;
        println!("✓ Discovered {} tools", found.len());
    } else {
        println!("⊘ No tools directory at {}", args.tools_dir.display());
    }

    println!("\n✓ Workspace ready for {}", args.user);
    Ok(())
}

/// Gate, alerts, simplification hints and a fresh system assessment.
pub fn check(ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    println!("RUNNING ALL CHECKS");
    println!("{}", "=".repeat(60));

    let gate = match quality::execute_gate(conn, CHECK_GATE, None) {
        Ok(Some(result)) => Reading::Ready(result),
        Ok(None) => Reading::NotConfigured(format!("no '{CHECK_GATE}' gate")),
        Err(e) => Reading::Failed(e.to_string()),
    };
    println!(
        "1. Quality gate:   {}",
        gate.render(|g| format!(
            "{} ({}/{})",
            if g.passed { "✓ PASS" } else { "✗ FAIL" },
            g.passed_rules,
            g.passed_rules + g.failed_rules
        ))
    );

    let alerts = quality::alerts(conn, false)?;
    if alerts.is_empty() {
        println!("2. Alerts:         ✓ All clear");
    } else {
        println!("2. Alerts:         ⚠ {} unresolved", alerts.len());
        for alert in alerts.iter().take(SEARCH_SHOWN) {
            println!("      - [{}] {}", alert.severity, alert.message);
        }
    }

    let suggestions = capabilities::suggest_simplification(conn)?;
    if suggestions.is_empty() {
        println!("3. Simplification: ✓ Nothing to simplify");
    } else {
        println!("3. Simplification: ⚠ {} suggestions", suggestions.len());
        for s in &suggestions {
            println!("      - {} ({} impact)", s.message, s.impact);
        }
    }

    let assessment = quality::run_assessment(conn, "system", "workspace")?;
    println!("4. Assessment:     {}/100 (Grade: {})", assessment.score, assessment.grade.letter());
    for finding in &assessment.findings {
        println!("      - {finding}");
    }
    Ok(())
}

fn section<T>(name: &str, items: &[T], line: impl Fn(&T) -> String) -> bool {
    if items.is_empty() {
        return false;
    }
    println!("{name} ({}):", items.len());
    for item in items.iter().take(SEARCH_SHOWN) {
        println!("   {}", line(item));
    }
    true
}

fn search_or_warn<T>(source: &str, result: crate::error::Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e: WsError| {
        tracing::warn!(source, error = %e, "search source failed");
        Vec::new()
    })
}

pub fn search(args: SearchArgs, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    let q = args.query.as_str();
    println!("Searching for: {q}\n");

    let kb = search_or_warn("knowledge", knowledge::search(conn, q));
    let ideas = search_or_warn("ideas", ideas::search(conn, q));
    let proposals = search_or_warn("proposals", proposals::search(conn, q));
    let todos = search_or_warn("todos", todos::search(conn, q));
    let pages = search_or_warn("wiki", wiki::search(conn, q));

    let mut found = section("Knowledge base", &kb, |e| format!("[{}] {}", e.category, e.title));
    found |= section("Ideas", &ideas, |i| format!("[{}] #{}: {}", i.category, i.id, i.title));
    found |= section("Proposals", &proposals, |p| format!("[{}] #{}: {}", p.status, p.id, p.title));
    found |= section("Todos", &todos, |t| format!("[{}] #{}: {}", t.status, t.id, t.title));
    found |= section("Wiki", &pages, |p| format!("{} ({})", p.title, p.path));

    if !found {
        println!("No results found.");
    }
    Ok(())
}
