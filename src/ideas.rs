//! Ideas harvested from other projects, with a "reality" score that
//! estimates whether the source is real working code.

use crate::domain::{IdeaStatus, Priority};
use crate::error::Result;
use crate::store::{self, like_pattern};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

static MOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)mock|fake|stub|dummy|test.*data|simulation|example|demo|sample")
        .expect("valid regex")
});
static OUTDATED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)deprecated|obsolete|old|legacy|python\s*2|TODO.*remove|FIXME.*outdated")
        .expect("valid regex")
});
static WORKING_RES: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"def\s+\w+\(").expect("valid regex"),
        Regex::new(r"class\s+\w+").expect("valid regex"),
        Regex::new(r"import\s+\w+").expect("valid regex"),
        Regex::new(r#"if\s+__name__\s*==\s*["']__main__["']"#).expect("valid regex"),
    ]
});
static TEST_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"test_|_test\.py|assert\s+").expect("valid regex"));
static TEST_CONTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"import\s+unittest|import\s+pytest|def\s+test_").expect("valid regex")
});
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(TODO|FIXME|HACK|NOTE):").expect("valid regex"));
static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"class\s+(\w+)").expect("valid regex"));

const HIGH_VALUE_WORDS: &[&str] = &["security", "critical", "urgent", "bug"];
const IMPROVEMENT_WORDS: &[&str] = &["performance", "optimize", "improve"];
const EMPHASIS_WORDS: &[&str] = &["important", "must", "required"];
const TENTATIVE_WORDS: &[&str] = &["maybe", "consider", "nice to have"];
const PLACEHOLDER_WORDS: &[&str] = &["test", "example", "demo"];

pub const MOCK_WARNING: &str = "MOCK/SIMULATION detected";
pub const OUTDATED_WARNING: &str = "OUTDATED code detected";
pub const WORKING_NOTE: &str = "Working code structure";
pub const TEST_WARNING: &str = "TEST code (not production)";
pub const MINIMAL_WARNING: &str = "Minimal/incomplete code";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Idea {
    pub id: i64,
    pub source: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub status: IdeaStatus,
    pub reality_score: i64,
    pub warnings: String,
    pub created_at: String,
}

impl Idea {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            source: row.get("source")?,
            title: row.get("title")?,
            description: row.get("description")?,
            category: row.get("category")?,
            priority: row.get("priority")?,
            status: row.get("status")?,
            reality_score: row.get("reality_score")?,
            warnings: row.get("warnings")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn tier(&self) -> RealityTier {
        RealityTier::of(self.reality_score)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIdea {
    pub source: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub reality_score: i64,
    pub warnings: String,
}

impl NewIdea {
    /// A hand-entered idea.
    pub fn manual(title: &str) -> Self {
        Self {
            source: "manual".to_string(),
            title: title.to_string(),
            description: String::new(),
            category: "general".to_string(),
            priority: Priority::Medium,
            reality_score: 100,
            warnings: "Manual entry".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealityTier {
    High,
    Medium,
    Low,
}

impl RealityTier {
    pub fn of(score: i64) -> Self {
        match score {
            s if s >= 70 => RealityTier::High,
            s if s >= 50 => RealityTier::Medium,
            _ => RealityTier::Low,
        }
    }
}

fn head(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Score how likely `content` at `path` is real, working code.
pub fn assess_reality(path: &Path, content: &str) -> (i64, Vec<&'static str>) {
    let mut score: i64 = 100;
    let mut warnings = Vec::new();
    let path_text = path.to_string_lossy();

    if MOCK_RE.is_match(&path_text) || MOCK_RE.is_match(head(content, 500)) {
        score -= 30;
        warnings.push(MOCK_WARNING);
    }

    if OUTDATED_RE.is_match(head(content, 1000)) {
        score -= 20;
        warnings.push(OUTDATED_WARNING);
    }

    let working = WORKING_RES.iter().filter(|re| re.is_match(content)).count();
    if working >= 3 {
        score += 10;
        warnings.push(WORKING_NOTE);
    }

    if TEST_PATH_RE.is_match(&path_text) || TEST_CONTENT_RE.is_match(content) {
        score -= 20;
        warnings.push(TEST_WARNING);
    }

    if content.chars().count() < 100 {
        score -= 30;
        warnings.push(MINIMAL_WARNING);
    }

    (score.clamp(0, 100), warnings)
}

/// Where a valued idea should go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationPath {
    /// High and urgent ideas: propose now.
    ImmediateProposal,
    ReviewQueue,
}

impl IntegrationPath {
    pub fn as_str(self) -> &'static str {
        match self {
            IntegrationPath::ImmediateProposal => "immediate_proposal",
            IntegrationPath::ReviewQueue => "review_queue",
        }
    }

    pub fn steps(self) -> &'static [&'static str] {
        match self {
            IntegrationPath::ImmediateProposal => {
                &["Create high-priority proposal", "Assign to current sprint", "Review before conversion"]
            }
            IntegrationPath::ReviewQueue => &["Add to review queue", "Prioritise by hand", "Decide manually"],
        }
    }
}

/// Keyword-based value estimate for an idea.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueAnalysis {
    pub value_score: i64,
    pub priority: Priority,
    pub path: IntegrationPath,
}

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Score an idea from keywords in its title and surrounding context.
///
/// Base 50: +30 for security/critical/urgent/bug in the title, +20 for
/// performance/optimize/improve, +15 for important/must/required in the
/// context, −20 for tentative wording and −15 for test/example/demo.
/// Urgent ≥80, high ≥65, medium ≥45, else low.
pub fn analyze_value(title: &str, context: &str) -> ValueAnalysis {
    let title = title.to_lowercase();
    let context = context.to_lowercase();

    let mut score: i64 = 50;
    if mentions(&title, HIGH_VALUE_WORDS) {
        score += 30;
    }
    if mentions(&title, IMPROVEMENT_WORDS) {
        score += 20;
    }
    if mentions(&context, EMPHASIS_WORDS) {
        score += 15;
    }
    if mentions(&title, TENTATIVE_WORDS) {
        score -= 20;
    }
    if mentions(&title, PLACEHOLDER_WORDS) {
        score -= 15;
    }
    let value_score = score.clamp(0, 100);

    let priority = match value_score {
        s if s >= 80 => Priority::Urgent,
        s if s >= 65 => Priority::High,
        s if s >= 45 => Priority::Medium,
        _ => Priority::Low,
    };
    let path = match priority {
        Priority::Urgent | Priority::High => IntegrationPath::ImmediateProposal,
        Priority::Medium | Priority::Low => IntegrationPath::ReviewQueue,
    };
    ValueAnalysis { value_score, priority, path }
}

/// Walk `root` and collect candidate ideas from Python sources and READMEs.
///
/// Files scoring below 50 are skipped entirely. Unreadable files are logged
/// and skipped.
pub fn extract_from_project(root: &Path) -> Vec<NewIdea> {
    let mut ideas = Vec::new();
    let mut seen_classes = HashSet::new();

    let mut files: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    for path in files.iter().filter(|p| p.extension().is_some_and(|e| e == "py")) {
        let Some(content) = read_lossy(path) else { continue };
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
        let (reality, warnings) = assess_reality(Path::new(&rel), &content);
        if reality < 50 {
            tracing::debug!(file = %rel, reality, "skipping low-reality file");
            continue;
        }
        let warnings = warnings.join("; ");

        let lines: Vec<&str> = content.lines().collect();
        for (lineno, line) in lines.iter().enumerate() {
            if MARKER_RE.is_match(line) {
                let title = head(line.trim(), 100).to_string();
                let context = lines[lineno.saturating_sub(2)..(lineno + 3).min(lines.len())].join("\n");
                ideas.push(NewIdea {
                    source: format!("{}:{}", rel, lineno + 1),
                    priority: analyze_value(&title, &context).priority,
                    title,
                    description: format!("From working code (reality: {reality}%)"),
                    category: "todo".to_string(),
                    reality_score: reality,
                    warnings: warnings.clone(),
                });
            }
        }

        if reality >= 70 {
            for caps in CLASS_RE.captures_iter(&content) {
                let name = &caps[1];
                if name.starts_with('_') || !seen_classes.insert(name.to_string()) {
                    continue;
                }
                let title = format!("Pattern: class {name}");
                ideas.push(NewIdea {
                    source: rel.clone(),
                    priority: analyze_value(&title, "").priority,
                    title,
                    description: format!("Working code pattern (reality: {reality}%)"),
                    category: "pattern".to_string(),
                    reality_score: reality,
                    warnings: warnings.clone(),
                });
            }
        }
    }

    let readmes = files.iter().filter(|p| {
        p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("README"))
    });
    for path in readmes {
        let Some(content) = read_lossy(path) else { continue };
        if content.chars().count() <= 100 {
            continue;
        }
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        ideas.push(NewIdea {
            source: path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string(),
            title: format!("Documentation: {name}"),
            description: head(&content, 200).to_string(),
            category: "documentation".to_string(),
            priority: Priority::Medium,
            reality_score: 80,
            warnings: "Documentation".to_string(),
        });
    }

    ideas
}

fn read_lossy(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!(error = %e, file = %path.display(), "failed to read file");
            None
        }
    }
}

pub fn add(conn: &Connection, idea: &NewIdea) -> Result<i64> {
    conn.execute(
        "INSERT INTO ideas(source, title, description, category, priority, reality_score, warnings, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            idea.source,
            idea.title,
            idea.description,
            idea.category,
            idea.priority,
            idea.reality_score.clamp(0, 100),
            idea.warnings,
            store::now_ts()
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, table = "ideas", "idea added");
    Ok(id)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Idea>> {
    Ok(conn.query_row("SELECT * FROM ideas WHERE id = ?1", [id], Idea::from_row).optional()?)
}

/// Ideas at or above `min_reality`, most real first.
pub fn list(conn: &Connection, category: Option<&str>, min_reality: i64) -> Result<Vec<Idea>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM ideas
         WHERE (?1 IS NULL OR category = ?1) AND reality_score >= ?2
         ORDER BY reality_score DESC, created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![category, min_reality], Idea::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn search(conn: &Connection, query: &str) -> Result<Vec<Idea>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM ideas WHERE title LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
         ORDER BY reality_score DESC, id DESC",
    )?;
    let rows = stmt.query_map([like_pattern(query)], Idea::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn mark_reviewed(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE ideas SET status = ?1 WHERE id = ?2",
        params![IdeaStatus::Reviewed, id],
    )?;
    Ok(changed > 0)
}

/// Result of storing a project scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub found: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub added: usize,
}

/// Extract ideas from `root` and store the high and medium reality ones.
pub fn scan(conn: &mut Connection, root: &Path) -> Result<ScanSummary> {
    let ideas = extract_from_project(root);
    let mut summary = ScanSummary { found: ideas.len(), ..Default::default() };

    let tx = conn.transaction()?;
    for idea in &ideas {
        match RealityTier::of(idea.reality_score) {
            RealityTier::High => summary.high += 1,
            RealityTier::Medium => summary.medium += 1,
            RealityTier::Low => {
                summary.low += 1;
                continue;
            }
        }
        add(&tx, idea)?;
        summary.added += 1;
    }
    tx.commit()?;
    Ok(summary)
}
