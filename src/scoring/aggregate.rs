// Aggregation strategies: combine per-agent scores into one 0-100 value.
//
// The default is the arithmetic mean. Strategies are swappable behind the
// Aggregator trait; the classifier only ever sees the resulting integer.
// Every strategy fails with NoData when there's nothing to combine and
// clamps its result to [0, 100].

use std::collections::HashMap;

use crate::db::models::AgentScore;
use crate::error::{EngineError, Result};

pub trait Aggregator: Send + Sync {
    /// Short identifier stored on each record (e.g. "mean").
    fn name(&self) -> &str;

    fn aggregate(&self, scores: &[AgentScore]) -> Result<u8>;
}

/// Round half away from zero and clamp into the score range.
fn to_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Arithmetic mean of all available scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAggregator;

impl Aggregator for MeanAggregator {
    fn name(&self) -> &str {
        "mean"
    }

    fn aggregate(&self, scores: &[AgentScore]) -> Result<u8> {
        if scores.is_empty() {
            return Err(EngineError::NoData);
        }
        let sum: f64 = scores.iter().map(|s| s.score).sum();
        Ok(to_score(sum / scores.len() as f64))
    }
}

/// The single highest score wins. Useful when any one alarmed agent
/// should be enough to escalate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxAggregator;

impl Aggregator for MaxAggregator {
    fn name(&self) -> &str {
        "max"
    }

    fn aggregate(&self, scores: &[AgentScore]) -> Result<u8> {
        scores
            .iter()
            .map(|s| s.score)
            .max_by(f64::total_cmp)
            .map(to_score)
            .ok_or(EngineError::NoData)
    }
}

/// Mean weighted per agent id. Agents without an explicit weight use
/// `default_weight`.
#[derive(Debug, Clone)]
pub struct WeightedMeanAggregator {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl WeightedMeanAggregator {
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self {
            weights,
            default_weight: 1.0,
        }
    }

    pub fn with_default_weight(mut self, weight: f64) -> Self {
        self.default_weight = weight;
        self
    }

    fn weight_of(&self, agent_id: &str) -> f64 {
        self.weights
            .get(agent_id)
            .copied()
            .unwrap_or(self.default_weight)
            .max(0.0)
    }
}

impl Aggregator for WeightedMeanAggregator {
    fn name(&self) -> &str {
        "weighted_mean"
    }

    fn aggregate(&self, scores: &[AgentScore]) -> Result<u8> {
        let (weighted, total) = scores.iter().fold((0.0, 0.0), |(sum, total), s| {
            let w = self.weight_of(&s.agent_id);
            (sum + s.score * w, total + w)
        });
        // Every contributing agent weighted to zero means nothing to go on.
        if total <= 0.0 {
            return Err(EngineError::NoData);
        }
        Ok(to_score(weighted / total))
    }
}

/// Pick a strategy by name ("mean", "max", "weighted_mean").
pub fn aggregator_from_settings(
    name: &str,
    weights: &HashMap<String, f64>,
) -> anyhow::Result<Box<dyn Aggregator>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "mean" => Ok(Box::new(MeanAggregator)),
        "max" => Ok(Box::new(MaxAggregator)),
        "weighted_mean" | "weighted" => Ok(Box::new(WeightedMeanAggregator::new(weights.clone()))),
        other => anyhow::bail!("unknown aggregator: {other} (expected mean, max, or weighted_mean)"),
    }
}
