//! Automated review, trend study and conclusions, combined into persisted
//! reports.
//!
//! Every metric is computed into a [`Reading`], so a broken or empty source
//! shows up in the report instead of silently disappearing.

use crate::domain::{ComplexityLevel, Grade, Priority, TodoStatus, ToolStatus, Trend};
use crate::error::{Reading, Result};
use crate::maintenance::capabilities::{self, ComplexityReport};
use crate::quality;
use crate::store::{self, insert_unique, json_column};
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

const HISTORY_SAMPLES: usize = 10;
const QUALITY_WINDOW: usize = 3;
const URGENT_LIMIT: i64 = 5;

// === Review ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySnapshot {
    pub score: i64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUsage {
    pub active: i64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoCounts {
    pub total: i64,
    pub urgent: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub timestamp: String,
    pub complexity: Reading<ComplexityReport>,
    pub quality: Reading<QualitySnapshot>,
    pub tools: Reading<ToolUsage>,
    pub todos: Reading<TodoCounts>,
    pub alerts: Reading<i64>,
    pub issues: Vec<String>,
    pub achievements: Vec<String>,
}

fn tool_usage(conn: &Connection) -> Result<Option<ToolUsage>> {
    let (active, usage, success): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(usage_count), 0), COALESCE(SUM(success_count), 0)
         FROM tools WHERE status = ?1",
        [ToolStatus::Active],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    if usage == 0 {
        return Ok(None);
    }
    let rate = success as f64 / usage as f64 * 100.0;
    Ok(Some(ToolUsage { active, success_rate: (rate * 10.0).round() / 10.0 }))
}

fn todo_counts(conn: &Connection) -> Result<Option<TodoCounts>> {
    let (total, urgent, completed): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(priority = ?1), 0),
                COALESCE(SUM(status = ?2), 0)
         FROM todos",
        params![Priority::Urgent, TodoStatus::Done],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok((total > 0).then_some(TodoCounts { total, urgent, completed }))
}

/// Snapshot of the current workspace state.
///
/// Records a complexity sample and a system assessment as a side effect, so
/// repeated reviews build the history that [`auto_study`] reads.
pub fn auto_review(conn: &Connection) -> Review {
    let complexity = Reading::capture("complexity", || capabilities::record_complexity(conn).map(Some));
    let quality = Reading::capture("quality", || {
        let assessment = quality::run_assessment(conn, "system", "workspace")?;
        Ok(Some(QualitySnapshot { score: assessment.score, grade: assessment.grade }))
    });
    let tools = Reading::capture("tool success rate", || tool_usage(conn));
    let todos = Reading::capture("todos", || todo_counts(conn));
    let alerts = Reading::capture("alerts", || quality::unresolved_alert_count(conn).map(Some));

    let mut issues = Vec::new();
    let mut achievements = Vec::new();

    if let Some(c) = complexity.ready() {
        match c.level {
            ComplexityLevel::Low => achievements.push(format!("Maintained low complexity: {}", c.score)),
            ComplexityLevel::High => issues.push(format!("High complexity detected: {}", c.score)),
            ComplexityLevel::Medium => {}
        }
    }
    if let Some(q) = quality.ready() {
        if matches!(q.grade, Grade::A | Grade::B) {
            achievements.push(format!("High quality maintained: {}", q.grade.letter()));
        } else {
            issues.push(format!("Quality needs improvement: {}", q.grade.letter()));
        }
    }
    if let Some(t) = tools.ready() {
        if t.success_rate >= 90.0 {
            achievements.push(format!("High tool success rate: {:.1}%", t.success_rate));
        } else if t.success_rate < 70.0 {
            issues.push(format!("Low tool success rate: {:.1}%", t.success_rate));
        }
    }
    if let Some(t) = todos.ready() {
        if t.urgent > URGENT_LIMIT {
            issues.push(format!("High urgent todo count: {}", t.urgent));
        }
    }
    if let Some(&count) = alerts.ready() {
        if count > 0 {
            issues.push(format!("{count} unresolved alerts"));
        }
    }

    Review {
        timestamp: store::now_ts(),
        complexity,
        quality,
        tools,
        todos,
        alerts,
        issues,
        achievements,
    }
}

// === Study ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTodos {
    pub completed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Study {
    pub timestamp: String,
    /// `decreasing`, `increasing` or `stable`.
    pub complexity_trend: Reading<&'static str>,
    pub quality_trend: Reading<Trend>,
    pub weekly_todos: Reading<WeeklyTodos>,
    pub patterns: Vec<String>,
    pub insights: Vec<String>,
}

fn recent_values(conn: &Connection, sql: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([HISTORY_SAMPLES as i64], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Direction of complexity between the oldest and newest of the recent samples.
pub fn complexity_direction(newest_first: &[i64]) -> Option<&'static str> {
    let (newest, oldest) = match newest_first {
        [newest, .., oldest] => (newest, oldest),
        _ => return None,
    };
    Some(match newest.cmp(oldest) {
        std::cmp::Ordering::Less => "decreasing",
        std::cmp::Ordering::Greater => "increasing",
        std::cmp::Ordering::Equal => "stable",
    })
}

/// Mean of the newest few scores against the mean of the oldest few.
pub fn quality_direction(newest_first: &[i64]) -> Option<Trend> {
    if newest_first.len() < 2 {
        return None;
    }
    let n = newest_first.len().min(QUALITY_WINDOW);
    let mean = |values: &[i64]| values.iter().sum::<i64>() as f64 / values.len() as f64;
    let recent = mean(&newest_first[..n]);
    let older = mean(&newest_first[newest_first.len() - n..]);
    Some(if recent > older {
        Trend::Improving
    } else if recent < older {
        Trend::Degrading
    } else {
        Trend::Stable
    })
}

fn weekly_todos(conn: &Connection) -> Result<Option<WeeklyTodos>> {
    let cutoff = store::format_ts(store::now() - Duration::days(7));
    let (completed, pending): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(status = ?1 AND completed_at > ?2), 0),
                COALESCE(SUM(status != ?1), 0)
         FROM todos",
        params![TodoStatus::Done, cutoff],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((completed + pending > 0).then_some(WeeklyTodos { completed, pending }))
}

fn top_tools(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let cutoff = store::format_ts(store::now() - Duration::days(7));
    let mut stmt = conn.prepare(
        "SELECT t.name, COUNT(*) AS runs FROM tool_executions e JOIN tools t ON t.id = e.tool_id
         WHERE e.created_at > ?1 GROUP BY e.tool_id ORDER BY runs DESC, t.name LIMIT 5",
    )?;
    let rows = stmt.query_map([cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Trends over the recorded history.
pub fn auto_study(conn: &Connection) -> Study {
    let complexity_trend = Reading::capture("complexity trend", || {
        let scores = recent_values(
            conn,
            "SELECT score FROM complexity_history ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        Ok(complexity_direction(&scores))
    });
    let quality_trend = Reading::capture("quality trend", || {
        let scores = recent_values(
            conn,
            "SELECT score FROM assessments WHERE kind = 'system'
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        Ok(quality_direction(&scores))
    });
    let weekly = Reading::capture("weekly todos", || weekly_todos(conn));

    let mut patterns = Vec::new();
    let mut insights = Vec::new();

    match complexity_trend.ready() {
        Some(&"decreasing") => insights.push("Complexity is decreasing".to_string()),
        Some(&"increasing") => insights.push("Complexity is increasing, consider simplification".to_string()),
        _ => {}
    }
    match quality_trend.ready() {
        Some(Trend::Improving) => insights.push("Quality is improving".to_string()),
        Some(Trend::Degrading) => insights.push("Quality is degrading, needs attention".to_string()),
        _ => {}
    }
    match top_tools(conn) {
        Ok(top) if !top.is_empty() => {
            let names: Vec<String> = top.iter().map(|(name, runs)| format!("{name} ({runs})")).collect();
            patterns.push(format!("Most used tools this week: {}", names.join(", ")));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "tool usage pattern unavailable"),
    }
    if let Some(w) = weekly.ready() {
        if w.completed > 0 {
            patterns.push(format!("Completed {} todos this week", w.completed));
            if w.pending > w.completed * 2 {
                insights.push("Todo backlog growing, prioritize completion".to_string());
            }
        }
    }

    Study {
        timestamp: store::now_ts(),
        complexity_trend,
        quality_trend,
        weekly_todos: weekly,
        patterns,
        insights,
    }
}

// === Conclusion ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Excellent,
    Healthy,
    NeedsAttention,
    Critical,
}

impl OverallStatus {
    pub fn classify(issues: usize, quality_score: i64) -> Self {
        if issues == 0 && quality_score >= 90 {
            OverallStatus::Excellent
        } else if issues <= 2 && quality_score >= 80 {
            OverallStatus::Healthy
        } else if issues <= 5 && quality_score >= 70 {
            OverallStatus::NeedsAttention
        } else {
            OverallStatus::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Excellent => "excellent",
            OverallStatus::Healthy => "healthy",
            OverallStatus::NeedsAttention => "needs_attention",
            OverallStatus::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conclusion {
    pub overall_status: OverallStatus,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub action_items: Vec<String>,
}

impl Conclusion {
    fn recommend(&mut self, recommendation: &str, action: &str) {
        self.recommendations.push(recommendation.to_string());
        self.action_items.push(format!("Run: {action}"));
    }
}

/// Overall verdict from a review and a study.
///
/// A quality reading without a value counts as a perfect score; failed readings
/// are listed as findings.
pub fn auto_conclude(review: &Review, study: &Study) -> Conclusion {
    let quality_score = review.quality.ready().map_or(100, |q| q.score);
    let mut conclusion = Conclusion {
        overall_status: OverallStatus::classify(review.issues.len(), quality_score),
        findings: Vec::new(),
        recommendations: Vec::new(),
        action_items: Vec::new(),
    };

    if !review.achievements.is_empty() {
        conclusion.findings.push(format!("Achievements: {} positive outcomes", review.achievements.len()));
    }
    if !review.issues.is_empty() {
        conclusion.findings.push(format!("Issues: {} items need attention", review.issues.len()));
    }
    let improving = usize::from(matches!(study.complexity_trend.ready(), Some(&"decreasing")))
        + usize::from(matches!(study.quality_trend.ready(), Some(Trend::Improving)));
    if improving > 0 {
        conclusion.findings.push(format!("Positive trends: {improving} metrics improving"));
    }
    let failed = [
        review.complexity.is_failed(),
        review.quality.is_failed(),
        review.tools.is_failed(),
        review.todos.is_failed(),
        review.alerts.is_failed(),
        study.complexity_trend.is_failed(),
        study.quality_trend.is_failed(),
        study.weekly_todos.is_failed(),
    ]
    .into_iter()
    .filter(|&f| f)
    .count();
    if failed > 0 {
        conclusion.findings.push(format!("{failed} metrics could not be computed"));
    }

    if review.complexity.ready().is_some_and(|c| c.score > 100) {
        conclusion.recommend("Reduce complexity through consolidation", "ws complexity suggest");
    }
    if review.todos.ready().is_some_and(|t| t.urgent > 3) {
        conclusion.recommend("Address urgent todos immediately", "ws todo list --priority urgent");
    }
    if review.alerts.ready().is_some_and(|&n| n > 0) {
        conclusion.recommend("Resolve outstanding alerts", "ws quality alerts");
    }
    if review.tools.ready().is_some_and(|t| t.success_rate < 90.0) {
        conclusion.recommend("Investigate and fix failing tools", "ws tool list");
    }
    if matches!(study.quality_trend.ready(), Some(Trend::Degrading)) {
        conclusion.recommend("Focus on quality improvement", "ws check");
    }
    if conclusion.recommendations.is_empty() {
        conclusion.recommend("Continue current practices", "ws maintain");
    }
    conclusion
}

// === Reports ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: i64,
    pub period: String,
    pub generated_at: String,
    pub review: Review,
    pub study: Study,
    pub conclusion: Conclusion,
}

impl Report {
    pub fn summary(&self) -> String {
        format!(
            "Status: {}, Issues: {}, Achievements: {}",
            self.conclusion.overall_status.as_str(),
            self.review.issues.len(),
            self.review.achievements.len()
        )
    }
}

/// Review, study and conclude, then store the combined report.
pub fn generate_report(conn: &Connection, period: &str) -> Result<Report> {
    let review = auto_review(conn);
    let study = auto_study(conn);
    let conclusion = auto_conclude(&review, &study);
    let mut report =
        Report { id: 0, period: period.to_string(), generated_at: store::now_ts(), review, study, conclusion };

    conn.execute(
        "INSERT INTO automated_reports(report_type, period, data, summary, recommendations, created_at)
         VALUES('system_review', ?1, ?2, ?3, ?4, ?5)",
        params![
            period,
            serde_json::to_string(&report)?,
            report.summary(),
            serde_json::to_string(&report.conclusion.recommendations)?,
            report.generated_at
        ],
    )?;
    report.id = conn.last_insert_rowid();
    tracing::debug!(id = report.id, period, status = report.conclusion.overall_status.as_str(), "report stored");
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReport {
    pub id: i64,
    pub report_type: String,
    pub period: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub created_at: String,
}

impl StoredReport {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            report_type: row.get("report_type")?,
            period: row.get("period")?,
            summary: row.get("summary")?,
            recommendations: json_column(row, "recommendations")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn list_reports(conn: &Connection, limit: usize) -> Result<Vec<StoredReport>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_type, period, summary, recommendations, created_at
         FROM automated_reports ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], StoredReport::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Recurring report jobs seeded by [`schedule_automated_tasks`].
pub const AUTOMATED_TASKS: &[(&str, &str)] =
    &[("daily_review", "daily"), ("weekly_study", "weekly"), ("monthly_report", "monthly")];

/// Seed the report schedule. Returns the task types that were newly added.
pub fn schedule_automated_tasks(conn: &Connection, now: NaiveDateTime) -> Result<Vec<&'static str>> {
    let next_run = store::format_ts(now);
    let mut added = Vec::new();
    for &(task_type, schedule) in AUTOMATED_TASKS {
        let inserted = insert_unique(
            conn,
            "INSERT INTO automation_schedule(task_type, schedule, next_run) VALUES(?1, ?2, ?3)",
            params![task_type, schedule, next_run],
        )?;
        if inserted.is_some() {
            added.push(task_type);
        }
    }
    Ok(added)
}
