// Database queries: CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.
// Content, tags and scoring records are insert-only: nothing here updates
// or deletes them.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::models::{
    format_timestamp, parse_timestamp, ActionTier, AgentScore, ContentCategory, ContentItem, HistoryCursor,
    HistoryFilter, HistoryOrder, ScoringRecord, ScoringRule, Tag, TierCounts, UnavailableAgent,
};

/// engine_state key holding the current rule set revision.
pub const RULE_SET_REVISION_KEY: &str = "rule_set_revision";

// --- Engine state ---

/// Get an engine state value by key.
pub fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM engine_state WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Set an engine state value (upsert).
pub fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO engine_state (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// --- Rules ---

/// Load the stored rule set, sorted by min_score ascending.
pub fn load_rules(conn: &Connection) -> Result<Vec<ScoringRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, label, min_score, max_score, action, description, revision
         FROM rules
         ORDER BY min_score ASC, id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, i32>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
        ))
    })?;

    let mut rules = Vec::new();
    for row in rows {
        let (id, label, min_score, max_score, action, description, revision) = row?;
        rules.push(ScoringRule {
            action: action
                .parse::<ActionTier>()
                .with_context(|| format!("Rule {id} has an invalid action"))?,
            id,
            label,
            min_score,
            max_score,
            description,
            revision: revision as u64,
        });
    }
    Ok(rules)
}

/// Read the stored rule set revision (0 when no rules were ever written).
pub fn rule_set_revision(conn: &Connection) -> Result<u64> {
    match get_state(conn, RULE_SET_REVISION_KEY)? {
        Some(value) => value
            .parse()
            .with_context(|| format!("Corrupt rule set revision: {value}")),
        None => Ok(0),
    }
}

/// Another writer committed a rule set since the caller last read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rule set revision is {stored}, expected {expected}")]
pub struct StaleRevision {
    pub expected: u64,
    pub stored: u64,
}

/// Replace the whole rule set and its revision in one transaction, but only
/// if the stored revision still equals `expected`.
///
/// The transaction takes the write lock up front (BEGIN IMMEDIATE), so the
/// revision check and the write see the same database state even with other
/// processes on the file. On a mismatch nothing is written and the error
/// carries a `StaleRevision`.
pub fn replace_rules(
    conn: &Connection,
    rules: &[ScoringRule],
    expected: u64,
    revision: u64,
) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .context("Failed to lock rule set for writing")?;
    let stored = rule_set_revision(&tx)?;
    if stored != expected {
        return Err(StaleRevision { expected, stored }.into());
    }

    tx.execute("DELETE FROM rules", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO rules (id, label, min_score, max_score, action, description, revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for rule in rules {
            stmt.execute(params![
                rule.id,
                rule.label,
                rule.min_score,
                rule.max_score,
                rule.action.as_str(),
                rule.description,
                rule.revision as i64,
            ])?;
        }
    }
    set_state(&tx, RULE_SET_REVISION_KEY, &revision.to_string())?;
    tx.commit().context("Failed to commit rule set")?;
    Ok(())
}

// --- Content ---

/// Store a new content item. Fails if the id already exists.
pub fn insert_content(conn: &Connection, item: &ContentItem) -> Result<()> {
    conn.execute(
        "INSERT INTO content_items (id, text, author_ref, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            item.id,
            item.text,
            item.author_ref,
            format_timestamp(&item.created_at),
        ],
    )
    .with_context(|| format!("Failed to store content {}", item.id))?;
    for tag in &item.tags {
        attach_tag(conn, &item.id, tag)?;
    }
    Ok(())
}

/// Load a content item with its tags.
pub fn get_content(conn: &Connection, id: &str) -> Result<Option<ContentItem>> {
    let mut stmt =
        conn.prepare("SELECT id, text, author_ref, created_at FROM content_items WHERE id = ?1")?;
    let row: Option<(String, String, String, String)> = stmt
        .query_row(params![id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .optional()?;

    match row {
        Some((id, text, author_ref, created_at)) => {
            let tags = get_tags(conn, &id)?;
            Ok(Some(ContentItem {
                created_at: parse_timestamp(&created_at)?,
                id,
                text,
                author_ref,
                tags,
            }))
        }
        None => Ok(None),
    }
}

pub fn content_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM content_items WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// --- Tags ---

/// Attach a tag to content. Returns false if a tag with that name was
/// already attached.
///
/// The first color seen for a tag name is the one kept.
pub fn attach_tag(conn: &Connection, content_id: &str, tag: &Tag) -> Result<bool> {
    conn.execute(
        "INSERT OR IGNORE INTO tags (name, color) VALUES (?1, ?2)",
        params![tag.name, tag.color],
    )?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO content_tags (content_id, tag_name) VALUES (?1, ?2)",
        params![content_id, tag.name],
    )?;
    Ok(inserted > 0)
}

/// Tags attached to a content item, in attachment order.
pub fn get_tags(conn: &Connection, content_id: &str) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, t.color
         FROM content_tags ct
         JOIN tags t ON t.name = ct.tag_name
         WHERE ct.content_id = ?1
         ORDER BY ct.rowid ASC",
    )?;
    let rows = stmt.query_map(params![content_id], |row| {
        Ok(Tag {
            name: row.get(0)?,
            color: row.get(1)?,
        })
    })?;

    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }
    Ok(tags)
}

// --- Scoring records ---

/// Append a scoring record. Returns false if a record with the same id
/// already exists (replays are no-ops).
pub fn insert_record(conn: &Connection, record: &ScoringRecord) -> Result<bool> {
    let agent_scores = serde_json::to_string(&record.agent_scores)?;
    let unavailable = serde_json::to_string(&record.unavailable_agents)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO scoring_records
            (id, content_id, content_snapshot, author_ref, agent_scores, unavailable_agents,
             aggregate_score, action_tier, rule_id, rule_set_revision, aggregator,
             final_verdict, recorded_at, category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.id,
            record.content_id,
            record.content_snapshot,
            record.author_ref,
            agent_scores,
            unavailable,
            record.aggregate_score,
            record.action_tier.as_str(),
            record.rule_id,
            record.rule_set_revision as i64,
            record.aggregator,
            record.final_verdict,
            format_timestamp(&record.recorded_at),
            record.category.map(|c| c.as_str()),
        ],
    )?;
    Ok(inserted > 0)
}

const RECORD_COLUMNS: &str = "seq, id, content_id, content_snapshot, author_ref, agent_scores,
    unavailable_agents, aggregate_score, action_tier, rule_id, rule_set_revision, aggregator,
    final_verdict, recorded_at, category";

/// A scoring_records row before JSON and timestamp decoding.
struct RawRecord {
    seq: i64,
    id: String,
    content_id: String,
    content_snapshot: String,
    author_ref: String,
    agent_scores: String,
    unavailable_agents: String,
    aggregate_score: u8,
    action_tier: String,
    rule_id: String,
    rule_set_revision: i64,
    aggregator: String,
    final_verdict: String,
    recorded_at: String,
    category: Option<String>,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            content_id: row.get(2)?,
            content_snapshot: row.get(3)?,
            author_ref: row.get(4)?,
            agent_scores: row.get(5)?,
            unavailable_agents: row.get(6)?,
            aggregate_score: row.get(7)?,
            action_tier: row.get(8)?,
            rule_id: row.get(9)?,
            rule_set_revision: row.get(10)?,
            aggregator: row.get(11)?,
            final_verdict: row.get(12)?,
            recorded_at: row.get(13)?,
            category: row.get(14)?,
        })
    }

    fn decode(self) -> Result<(HistoryCursor, ScoringRecord)> {
        let agent_scores: Vec<AgentScore> = serde_json::from_str(&self.agent_scores)
            .with_context(|| format!("Record {} has corrupt agent scores", self.id))?;
        let unavailable_agents: Vec<UnavailableAgent> =
            serde_json::from_str(&self.unavailable_agents)
                .with_context(|| format!("Record {} has corrupt unavailable agents", self.id))?;
        let cursor = HistoryCursor {
            recorded_at: self.recorded_at.clone(),
            seq: self.seq,
        };
        let record = ScoringRecord {
            recorded_at: parse_timestamp(&self.recorded_at)?,
            action_tier: self.action_tier.parse::<ActionTier>()?,
            category: self
                .category
                .as_deref()
                .map(str::parse::<ContentCategory>)
                .transpose()?,
            id: self.id,
            content_id: self.content_id,
            content_snapshot: self.content_snapshot,
            author_ref: self.author_ref,
            agent_scores,
            unavailable_agents,
            aggregate_score: self.aggregate_score,
            rule_id: self.rule_id,
            rule_set_revision: self.rule_set_revision as u64,
            aggregator: self.aggregator,
            final_verdict: self.final_verdict,
        };
        Ok((cursor, record))
    }
}

/// Load a single scoring record by id.
pub fn get_record(conn: &Connection, id: &str) -> Result<Option<ScoringRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM scoring_records WHERE id = ?1");
    let raw = conn
        .query_row(&sql, params![id], RawRecord::from_row)
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(raw.decode()?.1)),
        None => Ok(None),
    }
}

/// One page of history matching `filter`, starting strictly after `after`.
///
/// Ordering is by (recorded_at, seq) in the direction the filter asks for,
/// so a cursor taken from the last row of a page resumes exactly there.
pub fn query_records(
    conn: &Connection,
    filter: &HistoryFilter,
    after: Option<&HistoryCursor>,
    limit: u32,
) -> Result<Vec<(HistoryCursor, ScoringRecord)>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ref author) = filter.author_ref {
        values.push(Value::Text(author.clone()));
        clauses.push(format!("author_ref = ?{}", values.len()));
    }
    if let Some(tier) = filter.tier {
        values.push(Value::Text(tier.as_str().to_string()));
        clauses.push(format!("action_tier = ?{}", values.len()));
    }
    if let Some(ref content_id) = filter.content_id {
        values.push(Value::Text(content_id.clone()));
        clauses.push(format!("content_id = ?{}", values.len()));
    }
    if let Some(since) = filter.since {
        values.push(Value::Text(format_timestamp(&since)));
        clauses.push(format!("recorded_at >= ?{}", values.len()));
    }
    if let Some(until) = filter.until {
        values.push(Value::Text(format_timestamp(&until)));
        clauses.push(format!("recorded_at < ?{}", values.len()));
    }

    let (cmp, dir) = match filter.order {
        HistoryOrder::NewestFirst => ("<", "DESC"),
        HistoryOrder::OldestFirst => (">", "ASC"),
    };
    if let Some(cursor) = after {
        values.push(Value::Text(cursor.recorded_at.clone()));
        let ts = values.len();
        values.push(Value::Integer(cursor.seq));
        let seq = values.len();
        clauses.push(format!(
            "(recorded_at {cmp} ?{ts} OR (recorded_at = ?{ts} AND seq {cmp} ?{seq}))"
        ));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    values.push(Value::Integer(i64::from(limit)));
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM scoring_records {where_sql}
         ORDER BY recorded_at {dir}, seq {dir}
         LIMIT ?{}",
        values.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), RawRecord::from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.decode()?);
    }
    Ok(records)
}

/// Count scoring records per action tier.
pub fn tier_counts(conn: &Connection) -> Result<TierCounts> {
    let mut stmt =
        conn.prepare("SELECT action_tier, COUNT(*) FROM scoring_records GROUP BY action_tier")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = TierCounts::default();
    for row in rows {
        let (tier, count) = row?;
        counts.add(tier.parse()?, count as u64);
    }
    Ok(counts)
}
