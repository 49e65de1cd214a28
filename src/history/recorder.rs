// History recorder: the append-only audit log of classification decisions.
//
// A record that's been accepted must not be lost. Writes are retried with
// exponential backoff; if the store is still unavailable the record goes
// to a local spool (a JSON-lines file, or memory when no path is set) and
// `replay_pending` pushes it to the store later. Inserts are idempotent by
// record id, so a record replayed twice is stored once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::query::HistoryQuery;
use crate::agents::Collection;
use crate::db::models::{ContentItem, HistoryFilter, ScoringRecord};
use crate::db::Database;
use crate::error::{EngineError, Result, ValidationError};
use crate::scoring::Decision;

/// How a failed store write is retried before the record is spooled.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base...
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

enum Spool {
    File(PathBuf),
    Memory(Vec<ScoringRecord>),
}

pub struct HistoryRecorder {
    db: Arc<dyn Database>,
    spool: Mutex<Spool>,
    retry: RetryPolicy,
}

impl HistoryRecorder {
    /// Recorder spooling to `spool_path`, or to memory when `None`.
    pub fn new(db: Arc<dyn Database>, spool_path: Option<PathBuf>) -> Self {
        let spool = match spool_path {
            Some(path) => Spool::File(path),
            None => Spool::Memory(Vec::new()),
        };
        Self {
            db,
            spool: Mutex::new(spool),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Persist one classification decision.
    ///
    /// Succeeds whenever the inputs are well formed: if the store can't take
    /// the record right now it is spooled for replay. Only a failure of the
    /// spool itself is reported as a storage error.
    pub async fn record(
        &self,
        item: &ContentItem,
        collection: &Collection,
        decision: Decision,
    ) -> Result<ScoringRecord> {
        validate_inputs(item, collection, &decision)?;

        let record = ScoringRecord {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: item.id.clone(),
            content_snapshot: item.text.clone(),
            author_ref: item.author_ref.clone(),
            agent_scores: collection.scores.clone(),
            unavailable_agents: collection.unavailable.clone(),
            aggregate_score: decision.aggregate_score,
            action_tier: decision.action_tier,
            rule_id: decision.rule_id,
            rule_set_revision: decision.rule_set_revision,
            aggregator: decision.aggregator,
            category: decision.category,
            final_verdict: decision.verdict,
            recorded_at: Utc::now(),
        };

        match self.write_with_retry(&record).await {
            Ok(()) => {
                debug!(record_id = %record.id, content_id = %record.content_id, "Recorded decision");
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    error = %e,
                    "History store unavailable, spooling record for replay"
                );
                self.spool(&record).await?;
            }
        }

        Ok(record)
    }

    async fn write_with_retry(&self, record: &ScoringRecord) -> anyhow::Result<()> {
        let mut attempt = 1;
        loop {
            match self.db.insert_record(record).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt >= self.retry.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        record_id = %record.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "History write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn spool(&self, record: &ScoringRecord) -> Result<()> {
        let mut spool = self.spool.lock().await;
        match &mut *spool {
            Spool::Memory(pending) => pending.push(record.clone()),
            Spool::File(path) => append_line(path, record).await?,
        }
        Ok(())
    }

    /// Push spooled records into the store. Returns how many were written;
    /// records that still fail stay spooled.
    pub async fn replay_pending(&self) -> Result<usize> {
        let mut spool = self.spool.lock().await;
        let replayed = match &mut *spool {
            Spool::Memory(pending) => {
                let mut replayed = 0;
                let mut remaining = Vec::new();
                for record in pending.drain(..) {
                    match self.db.insert_record(&record).await {
                        Ok(_) => replayed += 1,
                        Err(e) => {
                            warn!(record_id = %record.id, error = %e, "Replay failed, keeping record");
                            remaining.push(record);
                        }
                    }
                }
                *pending = remaining;
                replayed
            }
            Spool::File(path) => self.replay_file(path).await?,
        };

        if replayed > 0 {
            info!(replayed, "Replayed spooled history records");
        }
        Ok(replayed)
    }

    async fn replay_file(&self, path: &Path) -> Result<usize> {
        let lines = read_lines(path).await?;
        if lines.is_empty() {
            return Ok(0);
        }

        let mut replayed = 0;
        let mut remaining: Vec<String> = Vec::new();
        for line in lines {
            let record: ScoringRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    // Left in place for an operator to inspect; never dropped.
                    warn!(error = %e, "Unreadable line in history spool");
                    remaining.push(line);
                    continue;
                }
            };
            match self.db.insert_record(&record).await {
                Ok(_) => replayed += 1,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Replay failed, keeping record");
                    remaining.push(line);
                }
            }
        }

        if remaining.is_empty() {
            tokio::fs::remove_file(path)
                .await
                .with_context(|| format!("Failed to clear history spool {}", path.display()))?;
        } else {
            let mut contents = remaining.join("\n");
            contents.push('\n');
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("Failed to rewrite history spool {}", path.display()))?;
        }
        Ok(replayed)
    }

    /// Number of records waiting in the spool.
    pub async fn pending_count(&self) -> Result<usize> {
        let spool = self.spool.lock().await;
        match &*spool {
            Spool::Memory(pending) => Ok(pending.len()),
            Spool::File(path) => Ok(read_lines(path).await?.len()),
        }
    }

    /// Look up one record, including records still waiting in the spool.
    pub async fn get(&self, id: &str) -> Result<ScoringRecord> {
        if let Some(record) = self.db.get_record(id).await? {
            return Ok(record);
        }

        let spool = self.spool.lock().await;
        let spooled = match &*spool {
            Spool::Memory(pending) => pending.iter().find(|r| r.id == id).cloned(),
            Spool::File(path) => read_lines(path)
                .await?
                .iter()
                .filter_map(|line| serde_json::from_str::<ScoringRecord>(line).ok())
                .find(|r| r.id == id),
        };
        spooled.ok_or_else(|| EngineError::not_found("record", id))
    }

    /// Lazily page through stored history matching `filter`.
    pub fn query(&self, filter: HistoryFilter) -> HistoryQuery {
        HistoryQuery::new(self.db.clone(), filter)
    }
}

/// Reject decisions that can't have come out of a real classification.
fn validate_inputs(item: &ContentItem, collection: &Collection, decision: &Decision) -> Result<()> {
    if item.id.trim().is_empty() {
        return malformed("content id is empty".to_string());
    }
    if collection.scores.is_empty() {
        return malformed("no agent scores".to_string());
    }
    if let Some(bad) = collection
        .scores
        .iter()
        .find(|s| s.agent_id.is_empty() || !(0.0..=100.0).contains(&s.score))
    {
        return malformed(format!("agent score {} from '{}' is invalid", bad.score, bad.agent_id));
    }
    if decision.aggregate_score > 100 {
        return malformed(format!("aggregate score {} exceeds 100", decision.aggregate_score));
    }
    if decision.rule_id.is_empty() {
        return malformed("rule id is empty".to_string());
    }
    if decision.verdict.trim().is_empty() {
        return malformed("verdict is empty".to_string());
    }
    Ok(())
}

fn malformed(msg: String) -> Result<()> {
    Err(ValidationError::MalformedRecord(msg).into())
}

async fn append_line(path: &Path, record: &ScoringRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create spool directory {}", parent.display()))?;
        }
    }
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open history spool {}", path.display()))?;
    file.write_all(line.as_bytes()).await?;
    file.sync_data().await?;
    Ok(())
}

/// Non-empty lines of the spool file; a missing file is an empty spool.
async fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read history spool {}", path.display())),
    }
}
