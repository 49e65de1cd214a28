// Unit tests for aggregation, classification and output helpers.
//
// Tests isolated pure functions: aggregation strategies (rounding, clamping,
// weights, empty input), classification at tier boundaries and against
// broken rule sets, verdict wording, and truncate_chars UTF-8 safety.

use std::collections::HashMap;

use verdict::agents::Collection;
use verdict::db::models::{
    default_rules, ActionTier, AgentScore, ContentCategory, ScoringRule, UnavailableAgent,
    UnavailableReason,
};
use verdict::error::EngineError;
use verdict::output::truncate_chars;
use verdict::rules::RuleSet;
use verdict::scoring::aggregate::{MaxAggregator, WeightedMeanAggregator};
use verdict::scoring::classify::{dominant_category, verdict_text};
use verdict::scoring::{aggregator_from_settings, classify, Aggregator, Decision, MeanAggregator};

fn score(agent_id: &str, value: f64) -> AgentScore {
    AgentScore {
        agent_id: agent_id.to_string(),
        agent_name: agent_id.to_string(),
        score: value,
        rationale: String::new(),
        category: None,
    }
}

fn defaults() -> RuleSet {
    RuleSet::new(1, default_rules())
}

// ============================================================
// Aggregation
// ============================================================

#[test]
fn mean_of_thirty_and_fifty_is_forty() {
    let scores = vec![score("a", 30.0), score("b", 50.0)];
    assert_eq!(MeanAggregator.aggregate(&scores).unwrap(), 40);
}

#[test]
fn mean_rounds_half_away_from_zero() {
    let scores = vec![score("a", 39.0), score("b", 40.0)];
    assert_eq!(MeanAggregator.aggregate(&scores).unwrap(), 40);

    let scores = vec![score("a", 59.0), score("b", 59.8)];
    assert_eq!(MeanAggregator.aggregate(&scores).unwrap(), 59);
}

#[test]
fn mean_of_nothing_is_no_data() {
    assert!(matches!(
        MeanAggregator.aggregate(&[]),
        Err(EngineError::NoData)
    ));
}

#[test]
fn max_picks_the_most_alarmed_agent() {
    let scores = vec![score("a", 12.0), score("b", 87.4), score("c", 40.0)];
    assert_eq!(MaxAggregator.aggregate(&scores).unwrap(), 87);
}

#[test]
fn weighted_mean_uses_per_agent_weights() {
    let weights = HashMap::from([("model".to_string(), 3.0)]);
    let agg = WeightedMeanAggregator::new(weights);
    // (80 * 3 + 20 * 1) / 4 = 65
    let scores = vec![score("model", 80.0), score("keyword", 20.0)];
    assert_eq!(agg.aggregate(&scores).unwrap(), 65);
}

#[test]
fn weighted_mean_with_all_zero_weights_is_no_data() {
    let agg = WeightedMeanAggregator::new(HashMap::new()).with_default_weight(0.0);
    assert!(matches!(
        agg.aggregate(&[score("a", 50.0)]),
        Err(EngineError::NoData)
    ));
}

#[test]
fn aggregator_lookup_by_name() {
    let weights = HashMap::new();
    assert_eq!(aggregator_from_settings("", &weights).unwrap().name(), "mean");
    assert_eq!(aggregator_from_settings("MAX", &weights).unwrap().name(), "max");
    assert_eq!(
        aggregator_from_settings("weighted_mean", &weights)
            .unwrap()
            .name(),
        "weighted_mean"
    );
    assert!(aggregator_from_settings("median", &weights).is_err());
}

// ============================================================
// Classification against the default tiers
// ============================================================

#[test]
fn tier_zero_is_retain() {
    assert_eq!(classify(0, &defaults()).unwrap().tier, ActionTier::Retain);
}

#[test]
fn tier_just_below_review() {
    assert_eq!(classify(39, &defaults()).unwrap().tier, ActionTier::Retain);
}

#[test]
fn tier_exact_boundary_review() {
    let c = classify(40, &defaults()).unwrap();
    assert_eq!(c.tier, ActionTier::Review);
    assert_eq!(c.rule.id, "2");
    assert_eq!(c.revision, 1);
}

#[test]
fn tier_just_below_escalate() {
    assert_eq!(classify(59, &defaults()).unwrap().tier, ActionTier::Review);
}

#[test]
fn tier_exact_boundary_escalate() {
    assert_eq!(classify(60, &defaults()).unwrap().tier, ActionTier::Escalate);
}

#[test]
fn tier_hundred_is_escalate() {
    let c = classify(100, &defaults()).unwrap();
    assert_eq!(c.tier, ActionTier::Escalate);
    assert_eq!(c.rule.id, "3");
}

// ============================================================
// Classification against broken rule sets
// ============================================================

#[test]
fn score_in_a_gap_is_an_invariant_violation() {
    let broken = RuleSet::new(
        7,
        vec![
            ScoringRule::new("low", "Low", 0, 40, ActionTier::Retain, ""),
            ScoringRule::new("high", "High", 60, 100, ActionTier::Escalate, ""),
        ],
    );
    match classify(50, &broken) {
        Err(EngineError::InvariantViolation {
            score,
            revision,
            matches,
        }) => {
            assert_eq!(score, 50);
            assert_eq!(revision, 7);
            assert_eq!(matches, 0);
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
    // Scores the broken set does cover still classify.
    assert_eq!(classify(10, &broken).unwrap().tier, ActionTier::Retain);
}

#[test]
fn score_in_an_overlap_is_an_invariant_violation() {
    let broken = RuleSet::new(
        3,
        vec![
            ScoringRule::new("a", "A", 0, 60, ActionTier::Retain, ""),
            ScoringRule::new("b", "B", 50, 100, ActionTier::Escalate, ""),
        ],
    );
    assert!(matches!(
        classify(55, &broken),
        Err(EngineError::InvariantViolation { matches: 2, .. })
    ));
}

// ============================================================
// Verdicts and categories
// ============================================================

#[test]
fn verdict_mentions_unavailable_agents() {
    let collection = Collection {
        scores: vec![score("a", 30.0), score("b", 50.0)],
        unavailable: vec![UnavailableAgent {
            agent_id: "slow".to_string(),
            reason: UnavailableReason::Timeout,
        }],
    };
    let c = classify(40, &defaults()).unwrap();
    let text = verdict_text(&c, &collection);
    assert_eq!(
        text,
        "Review: Needs human review (partial: 1 of 3 agents unavailable)"
    );

    let decision = Decision::new(40, &c, "mean", &collection);
    assert_eq!(decision.rule_id, "2");
    assert_eq!(decision.action_tier, ActionTier::Review);
    assert_eq!(decision.verdict, text);
}

#[test]
fn verdict_without_description_is_just_the_label() {
    let set = RuleSet::new(
        2,
        vec![ScoringRule::new("all", "Everything", 0, 100, ActionTier::Retain, "")],
    );
    let c = classify(42, &set).unwrap();
    assert_eq!(verdict_text(&c, &Collection::default()), "Everything");
}

#[test]
fn dominant_category_follows_the_highest_score() {
    let mut spam = score("heuristic", 70.0);
    spam.category = Some(ContentCategory::Advertising);
    let mut insult = score("keyword", 30.0);
    insult.category = Some(ContentCategory::ExplicitAttack);
    let quiet = score("model", 95.0);

    assert_eq!(
        dominant_category(&[insult, spam, quiet]),
        Some(ContentCategory::Advertising)
    );
    assert_eq!(dominant_category(&[score("x", 10.0)]), None);
}

// ============================================================
// truncate_chars: UTF-8 safety
// ============================================================

#[test]
fn truncate_ascii_within_limit() {
    assert_eq!(truncate_chars("hello", 10), "hello");
}

#[test]
fn truncate_ascii_over_limit() {
    assert_eq!(truncate_chars("hello world", 5), "hello...");
}

#[test]
fn truncate_multibyte_does_not_split_characters() {
    assert_eq!(truncate_chars("héllo wörld", 4), "héll...");
}
