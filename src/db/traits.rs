// Database trait: backend-agnostic async interface for all store operations.
//
// Implementor: SqliteDatabase (wraps rusqlite). All methods are async so a
// native async backend fits behind the same interface as the Mutex-wrapped
// synchronous one.
//
// The trait mirrors the queries.rs function signatures, so callers hold an
// `Arc<dyn Database>` and never touch a Connection directly.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{
    ContentItem, HistoryCursor, HistoryFilter, ScoringRecord, ScoringRule, Tag, TierCounts,
};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Rules ---

    /// Load the stored rule set, sorted by min_score ascending.
    async fn load_rules(&self) -> Result<Vec<ScoringRule>>;

    /// The revision of the stored rule set (0 if never written).
    async fn rule_set_revision(&self) -> Result<u64>;

    /// Atomically replace the stored rule set and its revision, provided the
    /// stored revision is still `expected`. Fails with
    /// `queries::StaleRevision` otherwise.
    async fn replace_rules(&self, rules: &[ScoringRule], expected: u64, revision: u64) -> Result<()>;

    // --- Content ---

    /// Store a new content item (and any tags it already carries).
    async fn insert_content(&self, item: &ContentItem) -> Result<()>;

    /// Load a content item with its tags.
    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>>;

    async fn content_exists(&self, id: &str) -> Result<bool>;

    // --- Tags ---

    /// Attach a tag; returns false if a tag with the same name was already attached.
    async fn attach_tag(&self, content_id: &str, tag: &Tag) -> Result<bool>;

    async fn get_tags(&self, content_id: &str) -> Result<Vec<Tag>>;

    // --- Scoring records ---

    /// Append a record; returns false if the record id already exists.
    async fn insert_record(&self, record: &ScoringRecord) -> Result<bool>;

    async fn get_record(&self, id: &str) -> Result<Option<ScoringRecord>>;

    /// One page of history, resuming strictly after `after`.
    async fn query_records(
        &self,
        filter: &HistoryFilter,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<(HistoryCursor, ScoringRecord)>>;

    async fn tier_counts(&self) -> Result<TierCounts>;
}
