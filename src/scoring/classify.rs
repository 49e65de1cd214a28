// Classifier: map an aggregate score onto the active rule set.
//
// Works on one RuleSet snapshot, never on the live store, so a concurrent
// rule update can't be observed halfway. Exactly one rule must match; if
// zero or several do, the rule set is broken and we refuse to guess.

use serde::Serialize;

use crate::agents::Collection;
use crate::db::models::{ActionTier, AgentScore, ContentCategory, ScoringRule};
use crate::error::{EngineError, Result};
use crate::rules::RuleSet;

/// The rule an aggregate score landed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub tier: ActionTier,
    pub rule: ScoringRule,
    /// Revision of the rule set the rule was taken from
    pub revision: u64,
}

/// Everything the history recorder needs to know about a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub aggregate_score: u8,
    pub action_tier: ActionTier,
    pub rule_id: String,
    pub rule_set_revision: u64,
    pub aggregator: String,
    pub category: Option<ContentCategory>,
    pub verdict: String,
}

impl Decision {
    pub fn new(
        aggregate_score: u8,
        classification: &Classification,
        aggregator: &str,
        collection: &Collection,
    ) -> Self {
        Self {
            aggregate_score,
            action_tier: classification.tier,
            rule_id: classification.rule.id.clone(),
            rule_set_revision: classification.revision,
            aggregator: aggregator.to_string(),
            category: dominant_category(&collection.scores),
            verdict: verdict_text(classification, collection),
        }
    }
}

pub fn classify(score: u8, rules: &RuleSet) -> Result<Classification> {
    let value = i32::from(score);
    let mut matching = rules.rules().iter().filter(|r| r.contains(value));

    match (matching.next(), matching.next()) {
        (Some(rule), None) => Ok(Classification {
            tier: rule.action,
            rule: rule.clone(),
            revision: rules.revision(),
        }),
        (first, second) => {
            let matches = usize::from(first.is_some()) + usize::from(second.is_some()) + matching.count();
            Err(EngineError::InvariantViolation {
                score,
                revision: rules.revision(),
                matches,
            })
        }
    }
}

/// Human-readable verdict: the rule's label and description, noting when
/// some agents didn't contribute.
pub fn verdict_text(classification: &Classification, collection: &Collection) -> String {
    let rule = &classification.rule;
    let mut text = if rule.description.is_empty() {
        rule.label.clone()
    } else {
        format!("{}: {}", rule.label, rule.description)
    };
    if collection.is_partial() {
        text.push_str(&format!(
            " (partial: {} of {} agents unavailable)",
            collection.unavailable.len(),
            collection.requested()
        ));
    }
    text
}

/// Category reported by the highest-scoring agent that reported one.
pub fn dominant_category(scores: &[AgentScore]) -> Option<ContentCategory> {
    scores
        .iter()
        .filter_map(|s| s.category.map(|c| (s.score, c)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{default_rules, UnavailableAgent, UnavailableReason};

    fn default_set() -> RuleSet {
        RuleSet::new(1, default_rules())
    }

    fn agent_score(id: &str, score: f64, category: Option<ContentCategory>) -> AgentScore {
        AgentScore {
            agent_id: id.to_string(),
            agent_name: id.to_string(),
            score,
            rationale: String::new(),
            category,
        }
    }

    #[test]
    fn test_every_score_maps_to_exactly_one_tier() {
        let rules = default_set();
        for score in 0..=100u8 {
            let c = classify(score, &rules).unwrap();
            let expected = match score {
                0..=39 => ActionTier::Retain,
                40..=59 => ActionTier::Review,
                _ => ActionTier::Escalate,
            };
            assert_eq!(c.tier, expected, "score {score}");
        }
    }

    #[test]
    fn test_boundary_lands_in_higher_bucket() {
        let c = classify(40, &default_set()).unwrap();
        assert_eq!(c.tier, ActionTier::Review);
        assert_eq!(c.rule.id, "2");
        assert_eq!(c.revision, 1);
    }

    #[test]
    fn test_100_is_escalate() {
        assert_eq!(classify(100, &default_set()).unwrap().tier, ActionTier::Escalate);
    }

    #[test]
    fn test_gap_is_invariant_violation() {
        let rules = RuleSet::new(
            7,
            vec![
                ScoringRule::new("1", "Retain", 0, 40, ActionTier::Retain, ""),
                ScoringRule::new("3", "Escalate", 60, 100, ActionTier::Escalate, ""),
            ],
        );
        let err = classify(50, &rules).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvariantViolation {
                score: 50,
                revision: 7,
                matches: 0
            }
        ));
    }

    #[test]
    fn test_overlap_is_invariant_violation() {
        let rules = RuleSet::new(
            2,
            vec![
                ScoringRule::new("1", "Retain", 0, 60, ActionTier::Retain, ""),
                ScoringRule::new("2", "Review", 40, 100, ActionTier::Review, ""),
            ],
        );
        let err = classify(45, &rules).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation { matches: 2, .. }));
    }

    #[test]
    fn test_verdict_text() {
        let c = classify(45, &default_set()).unwrap();
        let full = Collection {
            scores: vec![agent_score("a", 45.0, None)],
            unavailable: vec![],
        };
        assert_eq!(verdict_text(&c, &full), "Review: Needs human review");

        let partial = Collection {
            scores: vec![agent_score("a", 45.0, None), agent_score("b", 45.0, None)],
            unavailable: vec![UnavailableAgent {
                agent_id: "c".to_string(),
                reason: UnavailableReason::Timeout,
            }],
        };
        assert_eq!(
            verdict_text(&c, &partial),
            "Review: Needs human review (partial: 1 of 3 agents unavailable)"
        );
    }

    #[test]
    fn test_dominant_category() {
        let scores = vec![
            agent_score("a", 80.0, None),
            agent_score("b", 60.0, Some(ContentCategory::Flooding)),
            agent_score("c", 20.0, Some(ContentCategory::Normal)),
        ];
        assert_eq!(dominant_category(&scores), Some(ContentCategory::Flooding));
        assert_eq!(dominant_category(&[agent_score("a", 1.0, None)]), None);
    }

    #[test]
    fn test_decision_carries_classification() {
        let c = classify(70, &default_set()).unwrap();
        let collection = Collection {
            scores: vec![agent_score("a", 70.0, Some(ContentCategory::ExplicitAttack))],
            unavailable: vec![],
        };
        let decision = Decision::new(70, &c, "mean", &collection);
        assert_eq!(decision.action_tier, ActionTier::Escalate);
        assert_eq!(decision.rule_id, "3");
        assert_eq!(decision.category, Some(ContentCategory::ExplicitAttack));
        assert_eq!(decision.verdict, "Escalate: Likely violating content");
    }
}
