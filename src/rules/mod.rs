// Rule Store: the ordered, versioned set of scoring rules.
//
// The coverage invariant (ranges partition [0, 100] with no gaps and no
// overlaps) is checked here, at write time, so the classifier can rely on
// exactly one rule matching any score.

pub mod store;

pub use store::RuleStore;

use std::collections::HashSet;
use std::sync::Arc;

use crate::db::models::{ScoringRule, MAX_SCORE};
use crate::error::ValidationError;

/// An immutable snapshot of the active rules plus the revision they belong to.
///
/// Cloning is cheap; the classifier reads one snapshot for a whole
/// classification rather than rule-by-rule.
#[derive(Debug, Clone)]
pub struct RuleSet {
    revision: u64,
    rules: Arc<[ScoringRule]>,
}

impl RuleSet {
    /// Build a snapshot. Rules are sorted by min_score; validity is not checked.
    pub fn new(revision: u64, mut rules: Vec<ScoringRule>) -> Self {
        rules.sort_by(|a, b| a.min_score.cmp(&b.min_score).then_with(|| a.id.cmp(&b.id)));
        Self {
            revision,
            rules: rules.into(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Rules sorted by min_score ascending.
    pub fn rules(&self) -> &[ScoringRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&ScoringRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn is_valid(&self) -> bool {
        validate_rule_set(&self.rules).is_ok()
    }
}

/// Check a single rule's id and bounds.
pub fn validate_rule(rule: &ScoringRule) -> Result<(), ValidationError> {
    if rule.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }
    if rule.min_score >= rule.max_score {
        return Err(ValidationError::EmptyRange {
            id: rule.id.clone(),
            min: rule.min_score,
            max: rule.max_score,
        });
    }
    if rule.min_score < 0 || rule.max_score > MAX_SCORE {
        return Err(ValidationError::OutOfBounds {
            id: rule.id.clone(),
            min: rule.min_score,
            max: rule.max_score,
        });
    }
    Ok(())
}

/// First rule in `others` (other than `rule` itself, by id) whose range
/// intersects `rule`'s.
pub fn find_overlap<'a>(rule: &ScoringRule, others: &'a [ScoringRule]) -> Option<&'a ScoringRule> {
    others
        .iter()
        .filter(|other| other.id != rule.id)
        .find(|other| rule.overlaps(other))
}

/// Check the coverage invariant for a whole rule set.
pub fn validate_rule_set(rules: &[ScoringRule]) -> Result<(), ValidationError> {
    if rules.is_empty() {
        return Err(ValidationError::EmptyRuleSet);
    }

    let mut ids = HashSet::new();
    for rule in rules {
        validate_rule(rule)?;
        if !ids.insert(rule.id.as_str()) {
            return Err(ValidationError::DuplicateId(rule.id.clone()));
        }
    }

    let mut sorted: Vec<&ScoringRule> = rules.iter().collect();
    sorted.sort_by_key(|r| r.min_score);

    // Sorted by min, consecutive rules must meet exactly: an earlier rule
    // reaching past the next min is an overlap, falling short is a gap.
    let mut covered_to = 0;
    let mut previous: Option<&ScoringRule> = None;
    for rule in sorted {
        if rule.min_score > covered_to {
            return Err(ValidationError::Gap {
                from: covered_to,
                to: rule.min_score,
            });
        }
        if let Some(prev) = previous {
            if rule.min_score < covered_to {
                return Err(ValidationError::Overlap {
                    id: rule.id.clone(),
                    other: prev.id.clone(),
                });
            }
        }
        covered_to = rule.max_score;
        previous = Some(rule);
    }

    if covered_to < MAX_SCORE {
        return Err(ValidationError::Gap {
            from: covered_to,
            to: MAX_SCORE,
        });
    }
    Ok(())
}
