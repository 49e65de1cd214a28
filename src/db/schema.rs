// Database schema: table creation.
//
// A `schema_version` table records the schema version so later releases can
// migrate existing files. Version 1 is the only schema so far.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// Idempotent, so it runs on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Engine key/value state (rule set revision and the like)
        CREATE TABLE IF NOT EXISTS engine_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- The active rule set. Replaced as a whole inside one transaction.
        CREATE TABLE IF NOT EXISTS rules (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            min_score INTEGER NOT NULL,
            max_score INTEGER NOT NULL,        -- exclusive, except 100
            action TEXT NOT NULL,              -- RETAIN / REVIEW / ESCALATE
            description TEXT NOT NULL DEFAULT '',
            revision INTEGER NOT NULL
        );

        -- Content that entered the pipeline. Rows are never updated or deleted.
        CREATE TABLE IF NOT EXISTS content_items (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            author_ref TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            name TEXT PRIMARY KEY,
            color TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS content_tags (
            content_id TEXT NOT NULL REFERENCES content_items(id),
            tag_name TEXT NOT NULL REFERENCES tags(name),
            attached_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (content_id, tag_name)
        );

        -- Append-only audit log of classification decisions
        CREATE TABLE IF NOT EXISTS scoring_records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            content_id TEXT NOT NULL,
            content_snapshot TEXT NOT NULL,
            author_ref TEXT NOT NULL,
            agent_scores TEXT NOT NULL,        -- JSON array of AgentScore
            unavailable_agents TEXT NOT NULL,  -- JSON array of UnavailableAgent
            aggregate_score INTEGER NOT NULL,  -- 0 to 100
            action_tier TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            rule_set_revision INTEGER NOT NULL,
            aggregator TEXT NOT NULL,
            category TEXT,                     -- from the highest-scoring agent, if any
            final_verdict TEXT NOT NULL,
            recorded_at TEXT NOT NULL          -- fixed-width UTC, sorts as text
        );

        CREATE INDEX IF NOT EXISTS idx_records_time
            ON scoring_records(recorded_at, seq);

        CREATE INDEX IF NOT EXISTS idx_records_author
            ON scoring_records(author_ref);

        CREATE INDEX IF NOT EXISTS idx_records_tier
            ON scoring_records(action_tier);

        CREATE INDEX IF NOT EXISTS idx_records_content
            ON scoring_records(content_id);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Count the user-created tables (excludes SQLite internals).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_counts() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(table_count(&conn).unwrap(), 7);
    }

    #[test]
    fn test_records_table_has_category() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let has_category: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM pragma_table_info('scoring_records') WHERE name = 'category')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(has_category);
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        let versions: Vec<i64> = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(versions, vec![1]);
    }
}
