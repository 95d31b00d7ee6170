//! Quality metrics with degradation alerts, rule-based gates and graded
//! assessments.

use crate::domain::{Grade, ProposalStatus, Severity, ToolStatus, Trend};
use crate::error::{Result, WsError};
use crate::store::{self, insert_unique, json_column};
use chrono::Duration;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Samples compared at each end of the window when computing a trend.
const TREND_SAMPLES: usize = 5;
const DEFAULT_TREND_HOURS: i64 = 24;

// === Metrics ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub id: i64,
    pub component: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub passed: bool,
    pub created_at: String,
}

impl Metric {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            component: row.get("component")?,
            metric: row.get("metric")?,
            value: row.get("value")?,
            threshold: row.get("threshold")?,
            passed: status == "pass",
            created_at: row.get("created_at")?,
        })
    }
}

/// Record a measurement. A failing value also runs degradation detection.
pub fn record_metric(
    conn: &Connection,
    component: &str,
    metric: &str,
    value: f64,
    threshold: f64,
) -> Result<i64> {
    let passed = value >= threshold;
    conn.execute(
        "INSERT INTO quality_metrics(component, metric, value, threshold, status, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![component, metric, value, threshold, if passed { "pass" } else { "fail" }, store::now_ts()],
    )?;
    let id = conn.last_insert_rowid();
    if !passed {
        check_degradation(conn, component, metric, value, threshold)?;
    }
    Ok(id)
}

/// Recent samples of one metric, newest first.
pub fn recent_metrics(
    conn: &Connection,
    component: &str,
    metric: &str,
    hours: i64,
) -> Result<Vec<Metric>> {
    let cutoff = store::format_ts(store::now() - Duration::hours(hours));
    let mut stmt = conn.prepare(
        "SELECT * FROM quality_metrics WHERE component = ?1 AND metric = ?2 AND created_at > ?3
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![component, metric, cutoff], Metric::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Compare the mean of the newest samples with the mean of the oldest ones.
pub fn trend_of(newest_first: &[f64]) -> Trend {
    if newest_first.len() < 2 {
        return Trend::Stable;
    }
    let n = newest_first.len().min(TREND_SAMPLES);
    let recent = newest_first[..n].iter().sum::<f64>() / n as f64;
    let older = newest_first[newest_first.len() - n..].iter().sum::<f64>() / n as f64;
    if recent > older * 1.1 {
        Trend::Improving
    } else if recent < older * 0.9 {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}

pub fn metric_trend(conn: &Connection, component: &str, metric: &str, hours: i64) -> Result<Trend> {
    let values: Vec<f64> =
        recent_metrics(conn, component, metric, hours)?.into_iter().map(|m| m.value).collect();
    Ok(trend_of(&values))
}

// === Degradation alerts ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: i64,
    pub component: String,
    pub metric: String,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub resolved: bool,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl Alert {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            component: row.get("component")?,
            metric: row.get("metric")?,
            severity: row.get("severity")?,
            message: row.get("message")?,
            value: row.get("value")?,
            threshold: row.get("threshold")?,
            resolved: row.get("resolved")?,
            created_at: row.get("created_at")?,
            resolved_at: row.get("resolved_at")?,
        })
    }
}

/// Raise an alert when the metric is trending down. Returns the alert id.
pub fn check_degradation(
    conn: &Connection,
    component: &str,
    metric: &str,
    value: f64,
    threshold: f64,
) -> Result<Option<i64>> {
    if metric_trend(conn, component, metric, DEFAULT_TREND_HOURS)? != Trend::Degrading {
        return Ok(None);
    }
    let severity = if value < threshold * 0.5 { Severity::Critical } else { Severity::Warning };
    let message = format!("{component}.{metric} degrading: {value} (threshold: {threshold})");
    conn.execute(
        "INSERT INTO quality_alerts(component, metric, severity, message, value, threshold, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![component, metric, severity, message, value, threshold, store::now_ts()],
    )?;
    tracing::warn!(component, metric, %severity, value, threshold, "quality degradation detected");
    Ok(Some(conn.last_insert_rowid()))
}

pub fn alerts(conn: &Connection, resolved: bool) -> Result<Vec<Alert>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM quality_alerts WHERE resolved = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([resolved], Alert::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn unresolved_alert_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM quality_alerts WHERE resolved = 0", [], |row| row.get(0))?)
}

pub fn resolve_alert(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE quality_alerts SET resolved = 1, resolved_at = ?1 WHERE id = ?2 AND resolved = 0",
        params![store::now_ts(), id],
    )?;
    Ok(changed > 0)
}

// === Gates ===

/// One check inside a gate. Stored as JSON tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateRule {
    /// Latest value of a metric must reach `threshold`.
    Metric { component: String, metric: String, threshold: f64 },
    /// A tool's success percentage must reach `min_rate`.
    ToolSuccessRate { tool: String, min_rate: f64 },
    /// Average proposal review score over the last week must reach `min_score`.
    ReviewScore { min_score: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pass,
    Fail,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub rule: GateRule,
    pub status: RuleStatus,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gate {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub rules: Vec<GateRule>,
    pub active: bool,
    pub created_at: String,
}

impl Gate {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: row.get("kind")?,
            rules: json_column(row, "rules")?,
            active: row.get("active")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResult {
    pub gate: String,
    pub passed: bool,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub details: Vec<RuleResult>,
}

/// Create a gate. `None` when the name is taken.
pub fn create_gate(conn: &Connection, name: &str, kind: &str, rules: &[GateRule]) -> Result<Option<i64>> {
    insert_unique(
        conn,
        "INSERT INTO quality_gates(name, kind, rules, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![name, kind, serde_json::to_string(rules)?, store::now_ts()],
    )
}

pub fn list_gates(conn: &Connection) -> Result<Vec<Gate>> {
    let mut stmt = conn.prepare("SELECT * FROM quality_gates ORDER BY name")?;
    let rows = stmt.query_map([], Gate::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn evaluate(conn: &Connection, rule: &GateRule) -> Result<RuleResult> {
    let (value, floor) = match rule {
        GateRule::Metric { component, metric, threshold } => {
            let latest: Option<f64> = conn
                .query_row(
                    "SELECT value FROM quality_metrics WHERE component = ?1 AND metric = ?2
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    params![component, metric],
                    |row| row.get(0),
                )
                .optional()?;
            (latest, *threshold)
        }
        GateRule::ToolSuccessRate { tool, min_rate } => {
            let counts: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT success_count, failure_count FROM tools WHERE name = ?1",
                    [tool],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let rate = counts
                .filter(|(ok, failed)| ok + failed > 0)
                .map(|(ok, failed)| ok as f64 / (ok + failed) as f64 * 100.0);
            (rate, *min_rate)
        }
        GateRule::ReviewScore { min_score } => {
            let cutoff = store::format_ts(store::now() - Duration::days(7));
            let avg: Option<f64> = conn.query_row(
                "SELECT AVG(score) FROM reviews WHERE score IS NOT NULL AND created_at > ?1",
                [cutoff],
                |row| row.get(0),
            )?;
            (avg, *min_score)
        }
    };
    let status = match value {
        Some(v) if v >= floor => RuleStatus::Pass,
        Some(_) => RuleStatus::Fail,
        None => RuleStatus::NoData,
    };
    Ok(RuleResult { rule: rule.clone(), status, value })
}

/// Evaluate every rule of an active gate and log the execution.
///
/// Returns `None` when no active gate has that name. Rules without data fail.
pub fn execute_gate(conn: &Connection, name: &str, context: Option<&str>) -> Result<Option<GateResult>> {
    let gate = conn
        .query_row(
            "SELECT * FROM quality_gates WHERE name = ?1 AND active = 1",
            [name],
            Gate::from_row,
        )
        .optional()?;
    let Some(gate) = gate else {
        return Ok(None);
    };

    let details = gate.rules.iter().map(|rule| evaluate(conn, rule)).collect::<Result<Vec<_>>>()?;
    let passed_rules = details.iter().filter(|d| d.status == RuleStatus::Pass).count();
    let result = GateResult {
        gate: gate.name,
        passed: passed_rules == details.len(),
        passed_rules,
        failed_rules: details.len() - passed_rules,
        details,
    };

    conn.execute(
        "INSERT INTO gate_executions(gate_id, passed, results, context, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![gate.id, result.passed, serde_json::to_string(&result.details)?, context, store::now_ts()],
    )?;
    tracing::debug!(gate = %result.gate, passed = result.passed, "quality gate executed");
    Ok(Some(result))
}

// === Assessments ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub id: i64,
    pub kind: String,
    pub target: String,
    pub score: i64,
    pub grade: Grade,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: String,
}

impl Assessment {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            target: row.get("target")?,
            score: row.get("score")?,
            grade: row.get("grade")?,
            findings: json_column(row, "findings")?,
            recommendations: json_column(row, "recommendations")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Default)]
struct Scorecard {
    score: i64,
    findings: Vec<String>,
    recommendations: Vec<String>,
}

impl Scorecard {
    fn new() -> Self {
        Self { score: 100, ..Default::default() }
    }

    fn deduct(&mut self, points: i64, finding: String, recommendation: &str) {
        self.score -= points;
        self.findings.push(finding);
        self.recommendations.push(recommendation.to_string());
    }
}

fn assess_system(conn: &Connection) -> Result<Scorecard> {
    let mut card = Scorecard::new();

    let (active_tools, avg_success): (i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), AVG(CAST(success_count AS REAL) / NULLIF(usage_count, 0))
         FROM tools WHERE status = ?1",
        [ToolStatus::Active],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if active_tools > 0 {
        let rate = avg_success.unwrap_or(0.0) * 100.0;
        if rate < 80.0 {
            card.deduct(15, format!("Tool success rate low: {rate:.1}%"), "Review and fix failing tools");
        }
    }

    let cutoff = store::format_ts(store::now() - Duration::days(7));
    let recent_reviews: i64 =
        conn.query_row("SELECT COUNT(*) FROM reviews WHERE created_at > ?1", [cutoff], |row| row.get(0))?;
    if recent_reviews == 0 {
        card.deduct(10, "No reviews in last 7 days".to_string(), "Review pending proposals regularly");
    }

    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM proposals WHERE status = ?1",
        [ProposalStatus::Submitted],
        |row| row.get(0),
    )?;
    if pending > 10 {
        card.deduct(5, format!("{pending} pending proposals"), "Review and process proposals");
    }

    let unresolved = unresolved_alert_count(conn)?;
    if unresolved > 0 {
        card.deduct(
            5 * unresolved,
            format!("{unresolved} unresolved degradation alerts"),
            "Address degradation alerts",
        );
    }
    Ok(card)
}

fn assess_tool(conn: &Connection, name: &str) -> Result<Scorecard> {
    let tool = crate::tools::get(conn, name)?.ok_or_else(|| WsError::not_found("tool", name))?;
    let mut card = Scorecard::new();
    let rate = tool.success_rate();
    if rate < 90.0 {
        card.deduct(20, format!("Success rate: {rate:.1}%"), "Investigate and fix failures");
    }
    if tool.avg_runtime > 5.0 {
        card.deduct(10, format!("Slow execution: {:.2}s", tool.avg_runtime), "Optimize performance");
    }
    Ok(card)
}

/// Score `target` out of 100, grade it and persist the result.
///
/// `kind` is `system` (target is free text) or `tool` (target is a tool name).
pub fn run_assessment(conn: &Connection, kind: &str, target: &str) -> Result<Assessment> {
    let card = match kind {
        "system" => assess_system(conn)?,
        "tool" => assess_tool(conn, target)?,
        other => {
            return Err(WsError::InvalidValue { field: "assessment kind", value: other.to_string() })
        }
    };
    let score = card.score.clamp(0, 100);
    let grade = Grade::from_score(score);
    let created_at = store::now_ts();
    conn.execute(
        "INSERT INTO assessments(kind, target, score, grade, findings, recommendations, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            kind,
            target,
            score,
            grade,
            serde_json::to_string(&card.findings)?,
            serde_json::to_string(&card.recommendations)?,
            created_at
        ],
    )?;
    tracing::debug!(kind, target, score, grade = %grade, "assessment recorded");
    Ok(Assessment {
        id: conn.last_insert_rowid(),
        kind: kind.to_string(),
        target: target.to_string(),
        score,
        grade,
        findings: card.findings,
        recommendations: card.recommendations,
        created_at,
    })
}

pub fn latest_assessment(conn: &Connection, kind: &str) -> Result<Option<Assessment>> {
    Ok(conn
        .query_row(
            "SELECT * FROM assessments WHERE kind = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
            [kind],
            Assessment::from_row,
        )
        .optional()?)
}

/// Assessments of `kind` recorded within the last `days`, newest first.
pub fn assessments_since(conn: &Connection, kind: &str, days: i64) -> Result<Vec<Assessment>> {
    let cutoff = store::format_ts(store::now() - Duration::days(days));
    let mut stmt = conn.prepare(
        "SELECT * FROM assessments WHERE kind = ?1 AND created_at > ?2
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![kind, cutoff], Assessment::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{self, NewTool};
    use std::time::Duration as StdDuration;

    #[test]
    fn trend_compares_newest_and_oldest_samples() {
        assert_eq!(trend_of(&[]), Trend::Stable);
        assert_eq!(trend_of(&[5.0]), Trend::Stable);
        // Up to five samples both windows cover the same values.
        assert_eq!(trend_of(&[80.0, 100.0]), Trend::Stable);

        let series = |newer: f64, older: f64| -> Vec<f64> {
            std::iter::repeat(newer).take(5).chain(std::iter::repeat(older).take(5)).collect()
        };
        assert_eq!(trend_of(&series(120.0, 100.0)), Trend::Improving);
        assert_eq!(trend_of(&series(80.0, 100.0)), Trend::Degrading);
        assert_eq!(trend_of(&series(95.0, 100.0)), Trend::Stable);
    }

    #[test]
    fn failing_metric_on_downtrend_raises_alert() {
        let conn = store::open_in_memory().expect("db");
        for _ in 0..5 {
            record_metric(&conn, "api", "coverage", 100.0, 50.0).expect("record");
        }
        assert!(alerts(&conn, false).expect("alerts").is_empty());

        // Newest five average 84 against an older average of 100.
        record_metric(&conn, "api", "coverage", 20.0, 50.0).expect("record");
        let open = alerts(&conn, false).expect("alerts");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].severity, Severity::Critical);
        assert_eq!(open[0].message, "api.coverage degrading: 20 (threshold: 50)");

        assert!(resolve_alert(&conn, open[0].id).expect("resolve"));
        assert!(!resolve_alert(&conn, open[0].id).expect("resolve twice"));
        assert_eq!(unresolved_alert_count(&conn).expect("count"), 0);
    }

    #[test]
    fn failing_metric_without_history_is_not_an_alert() {
        let conn = store::open_in_memory().expect("db");
        record_metric(&conn, "api", "latency", 1.0, 50.0).expect("record");
        assert!(alerts(&conn, false).expect("alerts").is_empty());
    }

    #[test]
    fn gate_without_data_fails_until_metric_recorded() {
        let conn = store::open_in_memory().expect("db");
        let rules = vec![GateRule::Metric {
            component: "core".to_string(),
            metric: "tests".to_string(),
            threshold: 90.0,
        }];
        assert!(create_gate(&conn, "release", "pre-release", &rules).expect("create").is_some());
        assert_eq!(create_gate(&conn, "release", "other", &[]).expect("create"), None);

        let result = execute_gate(&conn, "release", None).expect("execute").expect("gate");
        assert!(!result.passed);
        assert_eq!(result.details[0].status, RuleStatus::NoData);

        record_metric(&conn, "core", "tests", 95.0, 90.0).expect("record");
        let result = execute_gate(&conn, "release", Some("v1.0")).expect("execute").expect("gate");
        assert!(result.passed);
        assert_eq!(result.passed_rules, 1);
        assert_eq!(result.details[0].value, Some(95.0));

        assert!(execute_gate(&conn, "missing", None).expect("execute").is_none());
        assert_eq!(list_gates(&conn).expect("list")[0].rules, rules);
    }

    #[test]
    fn gate_rules_round_trip_through_json() {
        let json = r#"[{"type":"tool_success_rate","tool":"lint","min_rate":75.0},{"type":"review_score","min_score":70}]"#;
        let rules: Vec<GateRule> = serde_json::from_str(json).expect("parse");
        assert_eq!(rules[0], GateRule::ToolSuccessRate { tool: "lint".to_string(), min_rate: 75.0 });
        assert_eq!(rules[1], GateRule::ReviewScore { min_score: 70.0 });
    }

    #[test]
    fn fresh_system_loses_points_for_missing_reviews() {
        let conn = store::open_in_memory().expect("db");
        let assessment = run_assessment(&conn, "system", "workspace").expect("assess");
        assert_eq!(assessment.score, 90);
        assert_eq!(assessment.grade, Grade::A);
        assert_eq!(assessment.findings, vec!["No reviews in last 7 days"]);
        assert_eq!(latest_assessment(&conn, "system").expect("latest").expect("row").score, 90);
    }

    #[test]
    fn tool_assessment_penalises_failures() {
        let mut conn = store::open_in_memory().expect("db");
        tools::register(&conn, &NewTool::new("flaky", "exit 1")).expect("register");
        tools::execute(&mut conn, "flaky", None, "u", StdDuration::from_secs(5)).expect("run");

        let assessment = run_assessment(&conn, "tool", "flaky").expect("assess");
        assert_eq!(assessment.score, 80);
        assert_eq!(assessment.grade, Grade::B);
        assert!(run_assessment(&conn, "tool", "ghost").is_err());
        assert!(run_assessment(&conn, "galaxy", "x").is_err());
    }

    #[test]
    fn alert_deductions_clamp_at_zero() {
        let conn = store::open_in_memory().expect("db");
        for i in 0..25 {
            conn.execute(
                "INSERT INTO quality_alerts(component, metric, severity, message, value, threshold, created_at)
                 VALUES('c', 'm', 'warning', 'x', 1, 2, ?1)",
                [format!("2024-01-01T00:00:{i:02}")],
            )
            .expect("insert");
        }
        let assessment = run_assessment(&conn, "system", "workspace").expect("assess");
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.grade, Grade::F);
    }
}
