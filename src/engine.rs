// Engine: the scoring pipeline and the operations exposed to callers.
//
// content → collector → aggregator → classifier → history recorder.
//
// Each submission runs as its own task and can be cancelled until the
// recorder is invoked; after that the record is final. Classification
// always works on one rule snapshot. If the snapshot turns out to be
// broken and the store has moved on since it was taken, classification is
// retried once with the fresh set; otherwise the violation is surfaced.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agents::{Collection, ScoreCollector};
use crate::config::Config;
use crate::db::models::{ContentItem, HistoryFilter, ScoringRecord, ScoringRule, Tag, TierCounts};
use crate::db::Database;
use crate::error::{EngineError, Result, ValidationError};
use crate::history::{HistoryQuery, HistoryRecorder, RetryPolicy};
use crate::rules::{RuleSet, RuleStore};
use crate::scoring::{classify, Aggregator, Classification, Decision, MeanAggregator};
use crate::tagging::{AutoTagger, TagService};

const STAGE_SCORING: u8 = 0;
const STAGE_RECORDING: u8 = 1;
const STAGE_CANCELLED: u8 = 2;

/// A running classification of one submitted content item.
#[derive(Debug)]
pub struct PipelineHandle {
    content_id: String,
    stage: Arc<AtomicU8>,
    task: JoinHandle<Result<ScoringRecord>>,
}

impl PipelineHandle {
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Cancel the pipeline. Returns false if recording has already begun,
    /// in which case the record will still be written.
    pub fn cancel(&self) -> bool {
        match self.stage.compare_exchange(
            STAGE_SCORING,
            STAGE_CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.task.abort();
                info!(content_id = %self.content_id, "Pipeline cancelled");
                true
            }
            Err(stage) => stage == STAGE_CANCELLED,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stage.load(Ordering::SeqCst) == STAGE_CANCELLED
    }

    /// Wait for the pipeline to finish.
    pub async fn wait(self) -> Result<ScoringRecord> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(EngineError::Cancelled),
            Err(e) => Err(EngineError::Storage(anyhow::anyhow!(
                "scoring pipeline for {} panicked: {e}",
                self.content_id
            ))),
        }
    }
}

struct Inner {
    db: Arc<dyn Database>,
    rules: RuleStore,
    collector: ScoreCollector,
    aggregator: Box<dyn Aggregator>,
    recorder: HistoryRecorder,
    tags: TagService,
    auto_tagger: AutoTagger,
    default_agents: Vec<String>,
}

/// Cheap to clone; clones share the same stores.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

pub struct EngineBuilder {
    db: Arc<dyn Database>,
    collector: ScoreCollector,
    aggregator: Box<dyn Aggregator>,
    spool_path: Option<PathBuf>,
    retry: RetryPolicy,
    auto_tagger: AutoTagger,
    default_agents: Option<Vec<String>>,
}

impl EngineBuilder {
    pub fn aggregator(mut self, aggregator: Box<dyn Aggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn spool_path(mut self, path: Option<PathBuf>) -> Self {
        self.spool_path = path;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn auto_tagger(mut self, auto_tagger: AutoTagger) -> Self {
        self.auto_tagger = auto_tagger;
        self
    }

    /// Agents used when a submission doesn't name any. Defaults to every
    /// registered agent.
    pub fn default_agents(mut self, agents: Vec<String>) -> Self {
        self.default_agents = Some(agents);
        self
    }

    /// Load the rule set and flush anything left in the history spool.
    pub async fn build(self) -> Result<Engine> {
        let rules = RuleStore::load(self.db.clone()).await?;
        let recorder =
            HistoryRecorder::new(self.db.clone(), self.spool_path).with_retry(self.retry);

        match recorder.pending_count().await {
            Ok(0) => {}
            Ok(pending) => {
                info!(pending, "Replaying spooled history records");
                if let Err(e) = recorder.replay_pending().await {
                    warn!(error = %e, "Spool replay failed, will retry later");
                }
            }
            Err(e) => warn!(error = %e, "Could not read history spool"),
        }

        let default_agents = self
            .default_agents
            .unwrap_or_else(|| self.collector.agent_ids());

        Ok(Engine {
            inner: Arc::new(Inner {
                tags: TagService::new(self.db.clone()),
                db: self.db,
                rules,
                collector: self.collector,
                aggregator: self.aggregator,
                recorder,
                auto_tagger: self.auto_tagger,
                default_agents,
            }),
        })
    }
}

impl Engine {
    pub fn builder(db: Arc<dyn Database>, collector: ScoreCollector) -> EngineBuilder {
        EngineBuilder {
            db,
            collector,
            aggregator: Box::new(MeanAggregator),
            spool_path: None,
            retry: RetryPolicy::default(),
            auto_tagger: AutoTagger::default(),
            default_agents: None,
        }
    }

    /// Wire an engine from environment configuration.
    pub async fn from_config(config: &Config, db: Arc<dyn Database>) -> anyhow::Result<Self> {
        let engine = Self::builder(db, config.build_collector()?)
            .aggregator(config.build_aggregator()?)
            .spool_path(config.spool_path.clone())
            .auto_tagger(config.build_auto_tagger())
            .default_agents(config.settings.enabled_agents.clone())
            .build()
            .await?;
        Ok(engine)
    }

    // --- Pipeline ---

    /// Store new content and start classifying it with the default agents.
    pub async fn submit_for_scoring(&self, text: &str, author_ref: &str) -> Result<PipelineHandle> {
        self.submit_with_agents(text, author_ref, None).await
    }

    /// Like `submit_for_scoring`, choosing which agents to ask.
    pub async fn submit_with_agents(
        &self,
        text: &str,
        author_ref: &str,
        agent_ids: Option<Vec<String>>,
    ) -> Result<PipelineHandle> {
        let item = self.ingest(text, author_ref).await?;
        let agents = agent_ids.unwrap_or_else(|| self.inner.default_agents.clone());

        let stage = Arc::new(AtomicU8::new(STAGE_SCORING));
        let engine = self.clone();
        let task_stage = stage.clone();
        let content_id = item.id.clone();
        let task =
            tokio::spawn(async move { engine.run_pipeline(&item, &agents, &task_stage).await });

        Ok(PipelineHandle {
            content_id,
            stage,
            task,
        })
    }

    /// Store a new content item, applying auto-tags.
    pub async fn ingest(&self, text: &str, author_ref: &str) -> Result<ContentItem> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        let mut item = ContentItem::new(text, author_ref);
        item.tags = self.inner.auto_tagger.suggest(&item);
        self.inner.db.insert_content(&item).await?;
        if !item.tags.is_empty() {
            info!(content_id = %item.id, tags = item.tags.len(), "Auto-tagged content");
        }
        Ok(item)
    }

    /// Classify an already-stored content item and record the decision.
    ///
    /// Each call produces its own record, so re-scoring never overwrites.
    pub async fn score_content(&self, item: &ContentItem, agent_ids: &[String]) -> Result<ScoringRecord> {
        let stage = AtomicU8::new(STAGE_SCORING);
        self.run_pipeline(item, agent_ids, &stage).await
    }

    async fn run_pipeline(
        &self,
        item: &ContentItem,
        agent_ids: &[String],
        stage: &AtomicU8,
    ) -> Result<ScoringRecord> {
        let (collection, decision) = self.evaluate(item, agent_ids).await?;

        if stage
            .compare_exchange(STAGE_SCORING, STAGE_RECORDING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::Cancelled);
        }

        let record = self.inner.recorder.record(item, &collection, decision).await?;
        info!(
            content_id = %item.id,
            record_id = %record.id,
            score = record.aggregate_score,
            tier = %record.action_tier,
            partial = record.is_partial(),
            "Content classified"
        );
        Ok(record)
    }

    /// Collect, aggregate and classify without recording.
    pub async fn evaluate(
        &self,
        item: &ContentItem,
        agent_ids: &[String],
    ) -> Result<(Collection, Decision)> {
        let collection = self.inner.collector.collect(item, agent_ids).await;

        let aggregator = &self.inner.aggregator;
        let score = match aggregator.aggregate(&collection.scores) {
            Ok(score) => score,
            Err(e) => {
                warn!(
                    content_id = %item.id,
                    unavailable = collection.unavailable.len(),
                    "No agent scores; content left unclassified"
                );
                return Err(e);
            }
        };

        let classification = self.classify_fresh(score).await?;
        let decision = Decision::new(score, &classification, aggregator.name(), &collection);
        Ok((collection, decision))
    }

    async fn classify_fresh(&self, score: u8) -> Result<Classification> {
        let snapshot = self.inner.rules.snapshot().await;
        match classify(score, &snapshot) {
            Err(err @ EngineError::InvariantViolation { .. }) => {
                let fresh = self.inner.rules.refresh().await?;
                if fresh.revision() == snapshot.revision() {
                    warn!(error = %err, "Active rule set is broken; needs an administrative fix");
                    return Err(err);
                }
                warn!(
                    stale = snapshot.revision(),
                    fresh = fresh.revision(),
                    "Classified against a stale rule set, retrying once"
                );
                classify(score, &fresh)
            }
            other => other,
        }
    }

    // --- Rules ---

    pub async fn get_active_rules(&self) -> Vec<ScoringRule> {
        self.inner.rules.list_rules().await
    }

    pub async fn rule_set(&self) -> RuleSet {
        self.inner.rules.snapshot().await
    }

    pub async fn upsert_rule(&self, rule: ScoringRule) -> Result<RuleSet> {
        self.inner.rules.upsert_rule(rule).await
    }

    pub async fn remove_rule(&self, id: &str, replacements: Vec<ScoringRule>) -> Result<RuleSet> {
        self.inner.rules.remove_rule(id, replacements).await
    }

    pub async fn replace_rules(&self, rules: Vec<ScoringRule>) -> Result<RuleSet> {
        self.inner.rules.replace_rules(rules).await
    }

    pub async fn reset_rules(&self) -> Result<RuleSet> {
        self.inner.rules.reset_to_defaults().await
    }

    // --- History ---

    /// Matching records, newest first unless the filter says otherwise.
    pub async fn get_history(
        &self,
        filter: HistoryFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ScoringRecord>> {
        let mut query = self.inner.recorder.query(filter);
        match limit {
            Some(limit) => query.take(limit).await,
            None => query.collect_all().await,
        }
    }

    /// Lazy query over history, for callers that page or stream.
    pub fn history(&self, filter: HistoryFilter) -> HistoryQuery {
        self.inner.recorder.query(filter)
    }

    pub async fn get_record(&self, id: &str) -> Result<ScoringRecord> {
        self.inner.recorder.get(id).await
    }

    pub async fn replay_pending(&self) -> Result<usize> {
        self.inner.recorder.replay_pending().await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.inner.recorder.pending_count().await
    }

    pub async fn tier_counts(&self) -> Result<TierCounts> {
        Ok(self.inner.db.tier_counts().await?)
    }

    // --- Content and tags ---

    pub async fn get_content(&self, id: &str) -> Result<ContentItem> {
        self.inner
            .db
            .get_content(id)
            .await?
            .ok_or_else(|| EngineError::not_found("content", id))
    }

    pub async fn get_tags(&self, content_id: &str) -> Result<Vec<Tag>> {
        self.inner.tags.get_tags(content_id).await
    }

    pub async fn attach_tag(&self, content_id: &str, tag: &Tag) -> Result<bool> {
        self.inner.tags.attach_tag(content_id, tag).await
    }

    // --- Introspection ---

    pub fn agent_ids(&self) -> Vec<String> {
        self.inner.collector.agent_ids()
    }

    pub fn default_agents(&self) -> &[String] {
        &self.inner.default_agents
    }

    pub fn aggregator_name(&self) -> &str {
        self.inner.aggregator.name()
    }
}
