// SqliteDatabase: rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    ContentItem, HistoryCursor, HistoryFilter, ScoringRecord, ScoringRule, Tag, TierCounts,
};
use super::queries;
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// A fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn load_rules(&self) -> Result<Vec<ScoringRule>> {
        let conn = self.conn.lock().await;
        queries::load_rules(&conn)
    }

    async fn rule_set_revision(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::rule_set_revision(&conn)
    }

    async fn replace_rules(&self, rules: &[ScoringRule], expected: u64, revision: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::replace_rules(&conn, rules, expected, revision)
    }

    async fn insert_content(&self, item: &ContentItem) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_content(&conn, item)
    }

    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>> {
        let conn = self.conn.lock().await;
        queries::get_content(&conn, id)
    }

    async fn content_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::content_exists(&conn, id)
    }

    async fn attach_tag(&self, content_id: &str, tag: &Tag) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::attach_tag(&conn, content_id, tag)
    }

    async fn get_tags(&self, content_id: &str) -> Result<Vec<Tag>> {
        let conn = self.conn.lock().await;
        queries::get_tags(&conn, content_id)
    }

    async fn insert_record(&self, record: &ScoringRecord) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::insert_record(&conn, record)
    }

    async fn get_record(&self, id: &str) -> Result<Option<ScoringRecord>> {
        let conn = self.conn.lock().await;
        queries::get_record(&conn, id)
    }

    async fn query_records(
        &self,
        filter: &HistoryFilter,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<(HistoryCursor, ScoringRecord)>> {
        let conn = self.conn.lock().await;
        queries::query_records(&conn, filter, after, limit)
    }

    async fn tier_counts(&self) -> Result<TierCounts> {
        let conn = self.conn.lock().await;
        queries::tier_counts(&conn)
    }
}
