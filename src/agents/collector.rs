// Agent score collector: concurrent fan-out to agents, fan-in with
// partial results.
//
// Every requested agent runs at the same time, each under its own timeout.
// An agent that times out, errors, isn't registered, or returns a score
// outside [0, 100] is reported as unavailable and left out; the collection
// itself never fails.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::traits::ScoringAgent;
use crate::db::models::{AgentScore, ContentItem, UnavailableAgent, UnavailableReason};
use crate::error::EngineError;

pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Scores gathered for one content item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    /// Scores from agents that answered, in request order
    pub scores: Vec<AgentScore>,
    /// Agents that were asked but did not answer usably
    pub unavailable: Vec<UnavailableAgent>,
}

impl Collection {
    /// Number of agents that were asked.
    pub fn requested(&self) -> usize {
        self.scores.len() + self.unavailable.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

/// Registry of agents plus the per-agent time budget.
pub struct ScoreCollector {
    agents: HashMap<String, Arc<dyn ScoringAgent>>,
    timeout: Duration,
}

impl ScoreCollector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agents: HashMap::new(),
            timeout,
        }
    }

    /// Register an agent under its own id, replacing any previous one.
    pub fn register(&mut self, agent: Arc<dyn ScoringAgent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    pub fn with_agent(mut self, agent: Arc<dyn ScoringAgent>) -> Self {
        self.register(agent);
        self
    }

    /// Registered agent ids, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask each agent in `agent_ids` to score `item`, concurrently.
    pub async fn collect(&self, item: &ContentItem, agent_ids: &[String]) -> Collection {
        let mut seen = HashSet::new();
        let requested: Vec<&String> = agent_ids.iter().filter(|id| seen.insert(*id)).collect();

        let outcomes = join_all(
            requested
                .iter()
                .map(|id| async move { (id.as_str(), self.invoke(id, item).await) }),
        )
        .await;

        let mut collection = Collection::default();
        for (agent_id, outcome) in outcomes {
            match outcome {
                Ok(score) => {
                    debug!(
                        content_id = %item.id,
                        agent = agent_id,
                        score = score.score,
                        "Agent scored content"
                    );
                    collection.scores.push(score);
                }
                Err(reason) => {
                    let err = EngineError::AgentUnavailable {
                        agent_id: agent_id.to_string(),
                        reason: reason.to_string(),
                    };
                    warn!(content_id = %item.id, error = %err, "Excluding agent from aggregate");
                    collection.unavailable.push(UnavailableAgent {
                        agent_id: agent_id.to_string(),
                        reason,
                    });
                }
            }
        }
        collection
    }

    async fn invoke(
        &self,
        agent_id: &str,
        item: &ContentItem,
    ) -> Result<AgentScore, UnavailableReason> {
        let agent = self
            .agents
            .get(agent_id)
            .ok_or(UnavailableReason::NotRegistered)?;

        let opinion = match tokio::time::timeout(self.timeout, agent.score(item)).await {
            Err(_) => return Err(UnavailableReason::Timeout),
            Ok(Err(e)) => return Err(UnavailableReason::Failed(format!("{e:#}"))),
            Ok(Ok(opinion)) => opinion,
        };

        if !(0.0..=100.0).contains(&opinion.score) {
            return Err(UnavailableReason::InvalidScore(opinion.score));
        }

        Ok(AgentScore {
            agent_id: agent.id().to_string(),
            agent_name: agent.name().to_string(),
            score: opinion.score,
            rationale: opinion.rationale,
            category: opinion.category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::traits::{AgentOpinion, FixedAgent};
    use anyhow::Result;
    use async_trait::async_trait;

    struct SlowAgent;

    #[async_trait]
    impl ScoringAgent for SlowAgent {
        fn id(&self) -> &str {
            "slow"
        }
        fn name(&self) -> &str {
            "Slow"
        }
        async fn score(&self, _item: &ContentItem) -> Result<AgentOpinion> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(AgentOpinion::new(99.0, "too late"))
        }
    }

    struct BrokenAgent;

    #[async_trait]
    impl ScoringAgent for BrokenAgent {
        fn id(&self) -> &str {
            "broken"
        }
        fn name(&self) -> &str {
            "Broken"
        }
        async fn score(&self, _item: &ContentItem) -> Result<AgentOpinion> {
            anyhow::bail!("upstream returned 503")
        }
    }

    fn fixed(id: &str, score: f64) -> Arc<dyn ScoringAgent> {
        Arc::new(FixedAgent::new(id, id.to_uppercase(), AgentOpinion::new(score, "fixed")))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_collects_in_request_order() {
        let collector = ScoreCollector::new(Duration::from_millis(200))
            .with_agent(fixed("a", 30.0))
            .with_agent(fixed("b", 50.0));
        let item = ContentItem::new("text", "author");
        let collection = collector.collect(&item, &ids(&["b", "a"])).await;
        let got: Vec<&str> = collection.scores.iter().map(|s| s.agent_id.as_str()).collect();
        assert_eq!(got, vec!["b", "a"]);
        assert!(!collection.is_partial());
    }

    #[tokio::test]
    async fn test_timeout_marks_agent_unavailable() {
        let collector = ScoreCollector::new(Duration::from_millis(50))
            .with_agent(fixed("a", 30.0))
            .with_agent(fixed("b", 50.0))
            .with_agent(Arc::new(SlowAgent));
        let item = ContentItem::new("text", "author");
        let collection = collector.collect(&item, &ids(&["a", "b", "slow"])).await;
        assert_eq!(collection.scores.len(), 2);
        assert_eq!(collection.requested(), 3);
        assert_eq!(
            collection.unavailable,
            vec![UnavailableAgent {
                agent_id: "slow".to_string(),
                reason: UnavailableReason::Timeout
            }]
        );
    }

    #[tokio::test]
    async fn test_errors_and_unknown_ids_are_unavailable() {
        let collector = ScoreCollector::new(Duration::from_millis(200))
            .with_agent(fixed("a", 10.0))
            .with_agent(Arc::new(BrokenAgent));
        let item = ContentItem::new("text", "author");
        let collection = collector.collect(&item, &ids(&["a", "broken", "ghost"])).await;
        assert_eq!(collection.scores.len(), 1);
        assert!(matches!(
            &collection.unavailable[0].reason,
            UnavailableReason::Failed(msg) if msg.contains("503")
        ));
        assert_eq!(collection.unavailable[1].reason, UnavailableReason::NotRegistered);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_rejected() {
        let collector = ScoreCollector::new(Duration::from_millis(200)).with_agent(fixed("hot", 140.0));
        let item = ContentItem::new("text", "author");
        let collection = collector.collect(&item, &ids(&["hot"])).await;
        assert!(collection.scores.is_empty());
        assert_eq!(
            collection.unavailable[0].reason,
            UnavailableReason::InvalidScore(140.0)
        );
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapse() {
        let collector = ScoreCollector::new(Duration::from_millis(200)).with_agent(fixed("a", 10.0));
        let item = ContentItem::new("text", "author");
        let collection = collector.collect(&item, &ids(&["a", "a"])).await;
        assert_eq!(collection.scores.len(), 1);
    }

    #[tokio::test]
    async fn test_agents_run_concurrently() {
        let collector = ScoreCollector::new(Duration::from_millis(300))
            .with_agent(Arc::new(SlowAgent))
            .with_agent(fixed("a", 10.0));
        let item = ContentItem::new("text", "author");
        let start = std::time::Instant::now();
        collector.collect(&item, &ids(&["slow", "a"])).await;
        // bounded by the single timeout, not the sum of agent latencies
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
