// RuleStore: the single writer for the active rule set.
//
// Readers take a RuleSet snapshot (whole set + revision) under a read lock.
// Writers are serialized by `writer`, validate the complete candidate set,
// persist it in one transaction together with the next revision, and only
// then swap the in-memory snapshot. A rejected mutation changes nothing.
//
// Another process sharing the database can also write rules. Each commit is
// a compare-and-swap on the stored revision inside one write transaction; if
// it moved, the snapshot is reloaded and the mutation is re-applied on top.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::{find_overlap, validate_rule, validate_rule_set, RuleSet};
use crate::db::models::{default_rules, ScoringRule};
use crate::db::queries::StaleRevision;
use crate::db::Database;
use crate::error::{EngineError, Result, ValidationError};

/// How many times a mutation is re-applied when another writer got there first.
const MAX_COMMIT_ATTEMPTS: usize = 3;

pub struct RuleStore {
    db: Arc<dyn Database>,
    active: RwLock<RuleSet>,
    writer: Mutex<()>,
}

impl RuleStore {
    /// Load the persisted rule set, seeding the defaults into an empty store.
    ///
    /// A persisted set that breaks the coverage invariant is still loaded so
    /// the classifier reports it, rather than silently replacing an
    /// administrator's rules.
    pub async fn load(db: Arc<dyn Database>) -> Result<Self> {
        let mut revision = db.rule_set_revision().await?;
        let mut rules = db.load_rules().await?;

        if rules.is_empty() && revision == 0 {
            let mut defaults = default_rules();
            for rule in &mut defaults {
                rule.revision = 1;
            }
            match db.replace_rules(&defaults, 0, 1).await {
                Ok(()) => {
                    revision = 1;
                    rules = defaults;
                    info!(revision, "Seeded default scoring rules");
                }
                // Another process seeded first; use what it wrote.
                Err(e) if e.downcast_ref::<StaleRevision>().is_some() => {
                    revision = db.rule_set_revision().await?;
                    rules = db.load_rules().await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let snapshot = RuleSet::new(revision, rules);
        if let Err(e) = validate_rule_set(snapshot.rules()) {
            warn!(revision, error = %e, "Stored rule set violates the coverage invariant");
        }

        Ok(Self {
            db,
            active: RwLock::new(snapshot),
            writer: Mutex::new(()),
        })
    }

    /// The full active rule set and its revision, read once.
    pub async fn snapshot(&self) -> RuleSet {
        self.active.read().await.clone()
    }

    pub async fn revision(&self) -> u64 {
        self.active.read().await.revision()
    }

    /// Active rules sorted by min_score ascending.
    pub async fn list_rules(&self) -> Vec<ScoringRule> {
        self.active.read().await.rules().to_vec()
    }

    /// Insert a new rule or update one in place (matched by id).
    ///
    /// Rejected if the rule's range is empty or out of bounds, overlaps
    /// another rule, or the resulting set would leave scores uncovered.
    /// To move a boundary between two rules use `replace_rules`.
    pub async fn upsert_rule(&self, rule: ScoringRule) -> Result<RuleSet> {
        validate_rule(&rule)?;
        self.mutate(|current| {
            if let Some(other) = find_overlap(&rule, current) {
                return Err(ValidationError::Overlap {
                    id: rule.id.clone(),
                    other: other.id.clone(),
                }
                .into());
            }
            let mut next: Vec<ScoringRule> = current
                .iter()
                .filter(|r| r.id != rule.id)
                .cloned()
                .collect();
            next.push(rule.clone());
            Ok(next)
        })
        .await
    }

    /// Remove a rule, optionally putting replacement rules in its place in
    /// the same atomic write.
    ///
    /// Refused if the result would leave any score uncovered.
    pub async fn remove_rule(&self, id: &str, replacements: Vec<ScoringRule>) -> Result<RuleSet> {
        for rule in &replacements {
            validate_rule(rule)?;
        }
        self.mutate(|current| {
            if !current.iter().any(|r| r.id == id) {
                return Err(EngineError::not_found("rule", id));
            }
            let mut next: Vec<ScoringRule> =
                current.iter().filter(|r| r.id != id).cloned().collect();
            for replacement in &replacements {
                if next.iter().any(|r| r.id == replacement.id) {
                    return Err(ValidationError::DuplicateId(replacement.id.clone()).into());
                }
                next.push(replacement.clone());
            }
            Ok(next)
        })
        .await
    }

    /// Replace the entire rule set atomically, validated as a unit.
    pub async fn replace_rules(&self, rules: Vec<ScoringRule>) -> Result<RuleSet> {
        validate_rule_set(&rules)?;
        self.mutate(|_| Ok(rules.clone())).await
    }

    /// Restore the built-in default rules.
    pub async fn reset_to_defaults(&self) -> Result<RuleSet> {
        self.replace_rules(default_rules()).await
    }

    /// Re-read the persisted rule set (another process may have changed it).
    pub async fn refresh(&self) -> Result<RuleSet> {
        let _guard = self.writer.lock().await;
        self.reload().await
    }

    async fn reload(&self) -> Result<RuleSet> {
        let revision = self.db.rule_set_revision().await?;
        let rules = self.db.load_rules().await?;
        let snapshot = RuleSet::new(revision, rules);
        *self.active.write().await = snapshot.clone();
        Ok(snapshot)
    }

    /// Apply `change` to the current rules, validate, persist, and swap.
    async fn mutate<F>(&self, change: F) -> Result<RuleSet>
    where
        F: Fn(&[ScoringRule]) -> Result<Vec<ScoringRule>>,
    {
        let _guard = self.writer.lock().await;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let current = self.active.read().await.clone();
            let next = change(current.rules())?;
            validate_rule_set(&next)?;

            let revision = current.revision() + 1;
            let next = stamp_revisions(&current, next, revision);
            if let Err(e) = self.db.replace_rules(&next, current.revision(), revision).await {
                let Some(stale) = e.downcast_ref::<StaleRevision>().copied() else {
                    return Err(e.into());
                };
                warn!(
                    ours = stale.expected,
                    stored = stale.stored,
                    "Rule set changed underneath us, reloading"
                );
                self.reload().await?;
                continue;
            }

            let snapshot = RuleSet::new(revision, next);
            *self.active.write().await = snapshot.clone();
            info!(revision, rules = snapshot.rules().len(), "Rule set updated");
            return Ok(snapshot);
        }

        Err(EngineError::Storage(anyhow::anyhow!(
            "rule set kept changing during update; gave up after {MAX_COMMIT_ATTEMPTS} attempts"
        )))
    }
}

/// Rules whose definition is unchanged keep their revision; new or edited
/// rules get `revision`.
fn stamp_revisions(current: &RuleSet, next: Vec<ScoringRule>, revision: u64) -> Vec<ScoringRule> {
    next.into_iter()
        .map(|mut rule| {
            rule.revision = match current.get(&rule.id) {
                Some(old) if same_definition(old, &rule) => old.revision,
                _ => revision,
            };
            rule
        })
        .collect()
}

fn same_definition(a: &ScoringRule, b: &ScoringRule) -> bool {
    a.label == b.label
        && a.min_score == b.min_score
        && a.max_score == b.max_score
        && a.action == b.action
        && a.description == b.description
}
