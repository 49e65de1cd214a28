// Scoring agent trait: the capability every scorer implements.
//
// An agent is anything that, given content, returns a risk score in
// [0, 100] and a rationale: a lexicon, a heuristic, a remote model, a
// human reviewer. The collector, aggregator and classifier never care
// which one produced a score.

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{ContentCategory, ContentItem};

/// What one agent concluded about one piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOpinion {
    /// 0.0 (benign) to 100.0 (certain violation)
    pub score: f64,
    pub rationale: String,
    pub category: Option<ContentCategory>,
}

impl AgentOpinion {
    pub fn new(score: f64, rationale: impl Into<String>) -> Self {
        Self {
            score,
            rationale: rationale.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: ContentCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Trait for scoring content. Async because most real scorers make
/// network calls or run inference off the calling thread.
#[async_trait]
pub trait ScoringAgent: Send + Sync {
    /// Stable identifier used in configuration and records.
    fn id(&self) -> &str;

    /// Human-readable name for display.
    fn name(&self) -> &str;

    /// Score one content item.
    async fn score(&self, item: &ContentItem) -> Result<AgentOpinion>;
}

/// An agent that returns a score supplied up front: a human reviewer's
/// manual assessment, or an upstream system's opinion passed through.
pub struct FixedAgent {
    id: String,
    name: String,
    opinion: AgentOpinion,
}

impl FixedAgent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, opinion: AgentOpinion) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            opinion,
        }
    }
}

#[async_trait]
impl ScoringAgent for FixedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, _item: &ContentItem) -> Result<AgentOpinion> {
        Ok(self.opinion.clone())
    }
}
