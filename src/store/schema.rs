//! SQLite schema for the workspace database.
//!
//! Every table the toolkit uses is declared here; no other module creates
//! tables on its own.

use crate::error::{Result, WsError};
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 1;

const TABLES: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ideas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT 'general',
        priority TEXT NOT NULL DEFAULT 'medium',
        status TEXT NOT NULL DEFAULT 'extracted',
        reality_score INTEGER NOT NULL DEFAULT 100
            CHECK (reality_score BETWEEN 0 AND 100),
        warnings TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS proposals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        rationale TEXT NOT NULL DEFAULT '',
        impact TEXT NOT NULL DEFAULT 'medium',
        effort TEXT NOT NULL DEFAULT 'medium',
        category TEXT NOT NULL DEFAULT 'improvement',
        status TEXT NOT NULL DEFAULT 'submitted',
        score INTEGER NOT NULL DEFAULT 0,
        submitted_by TEXT NOT NULL DEFAULT 'user',
        idea_id INTEGER REFERENCES ideas(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status);
    CREATE INDEX IF NOT EXISTS idx_proposals_idea ON proposals(idea_id);

    CREATE TABLE IF NOT EXISTS reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        proposal_id INTEGER NOT NULL REFERENCES proposals(id),
        reviewer TEXT NOT NULL,
        decision TEXT NOT NULL,
        score INTEGER,
        comments TEXT NOT NULL DEFAULT '',
        criteria_scores TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS criteria (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        weight INTEGER NOT NULL DEFAULT 1,
        active INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS workflow_overrides (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        proposal_id INTEGER NOT NULL REFERENCES proposals(id),
        action TEXT NOT NULL,
        actor TEXT NOT NULL,
        reason TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS todos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'todo',
        priority TEXT NOT NULL DEFAULT 'medium',
        project TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        due_date TEXT,
        proposal_id INTEGER REFERENCES proposals(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_todos_status ON todos(status);

    CREATE TABLE IF NOT EXISTS progress (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project TEXT NOT NULL,
        milestone TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'not_started',
        progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
        notes TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS wiki (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT UNIQUE NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        parent_id INTEGER REFERENCES wiki(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS knowledge (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        role TEXT NOT NULL DEFAULT 'contributor',
        email TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS discussions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        context_type TEXT,
        context_id INTEGER,
        proposal_id INTEGER REFERENCES proposals(id),
        status TEXT NOT NULL DEFAULT 'open',
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_discussions_proposal ON discussions(proposal_id);

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        discussion_id INTEGER NOT NULL REFERENCES discussions(id),
        author TEXT NOT NULL,
        content TEXT NOT NULL,
        reply_to INTEGER REFERENCES comments(id),
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS assignments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_type TEXT NOT NULL,
        item_id INTEGER NOT NULL,
        assigned_to TEXT NOT NULL,
        assigned_by TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'assigned',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        kind TEXT NOT NULL,
        message TEXT NOT NULL,
        link TEXT,
        read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tools (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        kind TEXT NOT NULL DEFAULT 'script',
        description TEXT NOT NULL DEFAULT '',
        command TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT 'general',
        version TEXT NOT NULL DEFAULT '1.0',
        status TEXT NOT NULL DEFAULT 'active',
        usage_count INTEGER NOT NULL DEFAULT 0,
        success_count INTEGER NOT NULL DEFAULT 0,
        failure_count INTEGER NOT NULL DEFAULT 0,
        avg_runtime REAL NOT NULL DEFAULT 0,
        last_used TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tool_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tool_id INTEGER NOT NULL REFERENCES tools(id),
        args TEXT NOT NULL DEFAULT '',
        username TEXT NOT NULL,
        status TEXT NOT NULL,
        runtime REAL NOT NULL,
        result TEXT NOT NULL DEFAULT '',
        error TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tool_improvements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tool_id INTEGER NOT NULL REFERENCES tools(id),
        kind TEXT NOT NULL,
        description TEXT NOT NULL,
        impact TEXT NOT NULL DEFAULT 'medium',
        status TEXT NOT NULL DEFAULT 'proposed',
        created_at TEXT NOT NULL,
        implemented_at TEXT
    );

    CREATE TABLE IF NOT EXISTS admin_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        admin TEXT NOT NULL,
        action TEXT NOT NULL,
        target_type TEXT NOT NULL,
        target_id INTEGER,
        details TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        title TEXT NOT NULL,
        context TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'active',
        started_at TEXT NOT NULL,
        ended_at TEXT
    );

    CREATE TABLE IF NOT EXISTS session_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS session_state (
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (session_id, key)
    );

    CREATE TABLE IF NOT EXISTS session_bookmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        message_id INTEGER REFERENCES session_messages(id),
        label TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS quality_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        component TEXT NOT NULL,
        metric TEXT NOT NULL,
        value REAL NOT NULL,
        threshold REAL NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_quality_metrics_lookup
        ON quality_metrics(component, metric, created_at);

    CREATE TABLE IF NOT EXISTS quality_alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        component TEXT NOT NULL,
        metric TEXT NOT NULL,
        severity TEXT NOT NULL,
        message TEXT NOT NULL,
        value REAL NOT NULL,
        threshold REAL NOT NULL,
        resolved INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        resolved_at TEXT
    );

    CREATE TABLE IF NOT EXISTS quality_gates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        kind TEXT NOT NULL,
        rules TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS gate_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        gate_id INTEGER NOT NULL REFERENCES quality_gates(id),
        passed INTEGER NOT NULL,
        results TEXT NOT NULL,
        context TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS assessments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        target TEXT NOT NULL,
        score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
        grade TEXT NOT NULL,
        findings TEXT NOT NULL DEFAULT '[]',
        recommendations TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS maintenance_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        schedule TEXT NOT NULL,
        command TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'normal',
        enabled INTEGER NOT NULL DEFAULT 1,
        last_run TEXT,
        next_run TEXT,
        run_count INTEGER NOT NULL DEFAULT 0,
        avg_duration REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS task_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES maintenance_tasks(id),
        status TEXT NOT NULL,
        duration REAL NOT NULL,
        output TEXT NOT NULL DEFAULT '',
        error TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS capabilities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        kind TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        complexity INTEGER NOT NULL DEFAULT 1,
        dependencies TEXT NOT NULL DEFAULT '[]',
        usage_count INTEGER NOT NULL DEFAULT 0,
        last_used TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS complexity_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        score INTEGER NOT NULL,
        level TEXT NOT NULL,
        breakdown TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS utilization (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        resource TEXT NOT NULL,
        used REAL NOT NULL,
        total REAL NOT NULL,
        percent REAL NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS health_checks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        component TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        data TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS automated_reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        report_type TEXT NOT NULL,
        period TEXT NOT NULL,
        data TEXT NOT NULL,
        summary TEXT NOT NULL,
        recommendations TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS automation_schedule (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_type TEXT UNIQUE NOT NULL,
        schedule TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_run TEXT,
        next_run TEXT
    );

    CREATE TABLE IF NOT EXISTS system_evolution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        captured_at TEXT NOT NULL,
        metric TEXT NOT NULL,
        value INTEGER NOT NULL,
        notes TEXT NOT NULL DEFAULT ''
    );
    CREATE INDEX IF NOT EXISTS idx_system_evolution_captured ON system_evolution(captured_at);
";

/// A proposal can only reach `converted` from an approved state, unless a
/// recorded override exists for it. `converted` and `rejected` are final.
const TRIGGERS: &str = "
    CREATE TRIGGER IF NOT EXISTS proposals_convert_guard
    BEFORE UPDATE OF status ON proposals
    WHEN NEW.status = 'converted'
        AND OLD.status NOT IN ('approved', 'validated', 'converted')
        AND NOT EXISTS (
            SELECT 1 FROM workflow_overrides
            WHERE proposal_id = OLD.id AND action = 'convert'
        )
    BEGIN
        SELECT RAISE(ABORT, 'illegal proposal transition');
    END;

    CREATE TRIGGER IF NOT EXISTS proposals_terminal_guard
    BEFORE UPDATE OF status ON proposals
    WHEN OLD.status IN ('converted', 'rejected') AND NEW.status <> OLD.status
    BEGIN
        SELECT RAISE(ABORT, 'illegal proposal transition');
    END;
";

const DEFAULT_CRITERIA: &str = "
    INSERT OR IGNORE INTO criteria(name, description, weight)
        VALUES ('impact', 'Expected benefit of the change', 3);
    INSERT OR IGNORE INTO criteria(name, description, weight)
        VALUES ('effort', 'Work required, lower is better', 2);
    INSERT OR IGNORE INTO criteria(name, description, weight)
        VALUES ('clarity', 'Description and rationale quality', 1);
";

/// Version recorded in an existing database, `None` for a fresh one.
fn stored_version(conn: &Connection) -> Result<Option<i64>> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }
    Ok(conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?)
}

/// Check the stored schema version, then create missing tables.
///
/// A database from a newer release is rejected before anything is written.
pub fn apply(conn: &Connection) -> Result<()> {
    let current = stored_version(conn)?;
    if let Some(version) = current.filter(|v| *v != SCHEMA_VERSION) {
        return Err(WsError::SchemaVersion { found: version, expected: SCHEMA_VERSION });
    }

    conn.execute_batch(TABLES)?;
    conn.execute_batch(TRIGGERS)?;
    if current.is_none() {
        conn.execute("INSERT INTO schema_version(version) VALUES(?1)", [SCHEMA_VERSION])?;
        conn.execute_batch(DEFAULT_CRITERIA)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_inserts_schema_version_and_criteria() {
        let conn = Connection::open_in_memory().expect("open db");
        apply(&conn).expect("apply schema");

        let version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .expect("query version");
        assert_eq!(version, SCHEMA_VERSION);

        let criteria: i64 = conn
            .query_row("SELECT COUNT(*) FROM criteria", [], |row| row.get(0))
            .expect("count criteria");
        assert_eq!(criteria, 3);
    }

    #[test]
    fn apply_is_idempotent() {
        let tmp = TempDir::new().expect("temp dir");
        let db = tmp.path().join("ws.db");
        for _ in 0..2 {
            let conn = Connection::open(&db).expect("open db");
            apply(&conn).expect("apply schema");
        }
        let conn = Connection::open(&db).expect("open db");
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .expect("count versions");
        assert_eq!(rows, 1);
    }

    #[test]
    fn apply_rejects_newer_schema_version() {
        let conn = Connection::open_in_memory().expect("open db");
        conn.execute_batch(
            "CREATE TABLE schema_version(version INTEGER NOT NULL);\
             INSERT INTO schema_version(version) VALUES(999);",
        )
        .expect("seed schema version");

        let err = apply(&conn).expect_err("must fail on unknown schema version");
        assert!(err.to_string().contains("Unsupported workspace schema version 999"));

        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'trigger')", [], |row| {
                row.get(0)
            })
            .expect("count tables");
        assert_eq!(tables, 1, "newer database must be left untouched");
    }
}
