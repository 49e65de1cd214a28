// Unit tests for the rule store and the coverage invariant.
//
// Every mutation the store accepts must leave a rule set in which each
// score 0..=100 falls in exactly one rule; every mutation it rejects must
// leave the set (and its revision) untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use proptest::sample::Index;
use verdict::db::models::{ActionTier, ScoringRule};
use verdict::db::sqlite::SqliteDatabase;
use verdict::db::Database;
use verdict::error::{EngineError, ValidationError};
use verdict::rules::{validate_rule_set, RuleSet, RuleStore};
use verdict::scoring::classify;

async fn fresh_store() -> (Arc<dyn Database>, RuleStore) {
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
    let store = RuleStore::load(db.clone()).await.unwrap();
    (db, store)
}

fn rule(id: &str, min: i32, max: i32, action: ActionTier) -> ScoringRule {
    ScoringRule::new(id, format!("Rule {id}"), min, max, action, "")
}

fn assert_covers_every_score(set: &RuleSet) {
    for score in 0..=100u8 {
        let matches = set
            .rules()
            .iter()
            .filter(|r| r.contains(score as i32))
            .count();
        assert_eq!(
            matches, 1,
            "score {score} matched {matches} rules at revision {}",
            set.revision()
        );
        assert!(classify(score, set).is_ok());
    }
}

// ============================================================
// Defaults and persistence
// ============================================================

#[tokio::test]
async fn fresh_store_has_default_tiers() {
    let (_db, store) = fresh_store().await;
    let set = store.snapshot().await;
    assert_eq!(set.revision(), 1);
    assert_covers_every_score(&set);

    let tiers: Vec<ActionTier> = set.rules().iter().map(|r| r.action).collect();
    assert_eq!(
        tiers,
        vec![ActionTier::Retain, ActionTier::Review, ActionTier::Escalate]
    );
}

#[tokio::test]
async fn rules_survive_reload() {
    let (db, store) = fresh_store().await;
    store
        .replace_rules(vec![
            rule("low", 0, 70, ActionTier::Retain),
            rule("high", 70, 100, ActionTier::Escalate),
        ])
        .await
        .unwrap();

    let reopened = RuleStore::load(db).await.unwrap();
    let set = reopened.snapshot().await;
    assert_eq!(set.revision(), 2);
    assert_eq!(set.rules().len(), 2);
    assert_eq!(set.get("high").unwrap().min_score, 70);
}

// ============================================================
// Rejected mutations change nothing
// ============================================================

#[tokio::test]
async fn upsert_leaving_a_gap_is_rejected() {
    let (_db, store) = fresh_store().await;
    // Shrinking Review to [40, 50) would leave [50, 60) uncovered.
    let err = store
        .upsert_rule(rule("2", 40, 50, ActionTier::Review))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::Gap { from: 50, to: 60 })
    ));
    assert_eq!(store.revision().await, 1);
}

#[tokio::test]
async fn upsert_with_empty_range_is_rejected() {
    let (_db, store) = fresh_store().await;
    let err = store
        .upsert_rule(rule("x", 50, 50, ActionTier::Review))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::EmptyRange { .. })
    ));
}

#[tokio::test]
async fn upsert_out_of_bounds_is_rejected() {
    let (_db, store) = fresh_store().await;
    let err = store
        .upsert_rule(rule("3", 60, 101, ActionTier::Escalate))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::OutOfBounds { .. })
    ));
}

#[tokio::test]
async fn remove_without_replacement_is_rejected() {
    let (_db, store) = fresh_store().await;
    let err = store.remove_rule("2", Vec::new()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::Gap { from: 40, to: 60 })
    ));
    assert_eq!(store.list_rules().await.len(), 3);
}

#[tokio::test]
async fn remove_unknown_rule_is_not_found() {
    let (_db, store) = fresh_store().await;
    let err = store.remove_rule("nope", Vec::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "rule", .. }));
}

#[tokio::test]
async fn replace_with_overlap_is_rejected() {
    let (_db, store) = fresh_store().await;
    let err = store
        .replace_rules(vec![
            rule("a", 0, 60, ActionTier::Retain),
            rule("b", 50, 100, ActionTier::Escalate),
        ])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::Overlap { .. })
    ));
    assert_eq!(store.revision().await, 1);
}

#[tokio::test]
async fn replace_with_nothing_is_rejected() {
    let (_db, store) = fresh_store().await;
    let err = store.replace_rules(Vec::new()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::EmptyRuleSet)
    ));
}

// ============================================================
// Accepted mutations
// ============================================================

#[tokio::test]
async fn remove_with_replacements_splits_a_tier() {
    let (_db, store) = fresh_store().await;
    let set = store
        .remove_rule(
            "2",
            vec![
                rule("2a", 40, 50, ActionTier::Review),
                rule("2b", 50, 60, ActionTier::Escalate),
            ],
        )
        .await
        .unwrap();
    assert_eq!(set.revision(), 2);
    assert_eq!(set.rules().len(), 4);
    assert_covers_every_score(&set);
    assert_eq!(classify(55, &set).unwrap().rule.id, "2b");
}

#[tokio::test]
async fn reset_restores_defaults_with_new_revision() {
    let (_db, store) = fresh_store().await;
    store
        .replace_rules(vec![rule("all", 0, 100, ActionTier::Retain)])
        .await
        .unwrap();
    let set = store.reset_to_defaults().await.unwrap();
    assert_eq!(set.revision(), 3);
    assert_eq!(set.rules().len(), 3);
    assert_covers_every_score(&set);
}

// ============================================================
// Generated mutation sequences keep coverage
// ============================================================

#[derive(Debug, Clone)]
enum Mutation {
    /// Replace the whole set with a partition of [0, 100] at these cuts.
    Replace { cuts: Vec<i32>, tiers: Vec<usize> },
    /// Overwrite an existing rule with an arbitrary range.
    Edit { pick: Index, min: i32, width: i32, tier: usize },
    /// Add a rule under a fresh id.
    Insert { min: i32, width: i32, tier: usize },
    /// Remove a rule, handing its range to a replacement or not.
    Remove { pick: Index, hand_over: bool },
}

fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (
            prop::collection::vec(1i32..100, 0..5),
            prop::collection::vec(0usize..3, 6)
        )
            .prop_map(|(cuts, tiers)| Mutation::Replace { cuts, tiers }),
        (any::<Index>(), 0i32..=100, 1i32..=40, 0usize..3)
            .prop_map(|(pick, min, width, tier)| Mutation::Edit { pick, min, width, tier }),
        (0i32..=100, 1i32..=40, 0usize..3)
            .prop_map(|(min, width, tier)| Mutation::Insert { min, width, tier }),
        (any::<Index>(), any::<bool>())
            .prop_map(|(pick, hand_over)| Mutation::Remove { pick, hand_over }),
    ]
}

fn partition(cuts: &[i32], tiers: &[usize]) -> Vec<ScoringRule> {
    let mut bounds = vec![0];
    bounds.extend(cuts.iter().copied());
    bounds.sort_unstable();
    bounds.dedup();
    bounds.push(100);
    bounds
        .windows(2)
        .enumerate()
        .map(|(i, w)| rule(&format!("p{i}"), w[0], w[1], ActionTier::ALL[tiers[i % tiers.len()]]))
        .collect()
}

async fn apply(store: &RuleStore, before: &RuleSet, step: usize, m: &Mutation) -> verdict::error::Result<RuleSet> {
    match m {
        Mutation::Replace { cuts, tiers } => store.replace_rules(partition(cuts, tiers)).await,
        Mutation::Edit { pick, min, width, tier } => {
            let target = &before.rules()[pick.index(before.rules().len())];
            let max = (min + width).min(100);
            store
                .upsert_rule(rule(&target.id, *min, max, ActionTier::ALL[*tier]))
                .await
        }
        Mutation::Insert { min, width, tier } => {
            let max = (min + width).min(100);
            store
                .upsert_rule(rule(&format!("new{step}"), *min, max, ActionTier::ALL[*tier]))
                .await
        }
        Mutation::Remove { pick, hand_over } => {
            let victim = before.rules()[pick.index(before.rules().len())].clone();
            let replacements = if *hand_over {
                vec![rule(&format!("r{step}"), victim.min_score, victim.max_score, victim.action)]
            } else {
                Vec::new()
            };
            store.remove_rule(&victim.id, replacements).await
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn accepted_mutations_always_keep_full_coverage(
        mutations in prop::collection::vec(mutation(), 1..40)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let (_db, store) = fresh_store().await;
            for (step, m) in mutations.iter().enumerate() {
                let before = store.snapshot().await;
                let result = apply(&store, &before, step, m).await;
                let after = store.snapshot().await;

                match result {
                    Ok(set) => {
                        prop_assert_eq!(set.revision(), before.revision() + 1);
                        prop_assert_eq!(after.revision(), set.revision());
                    }
                    Err(_) => {
                        prop_assert_eq!(after.revision(), before.revision());
                        prop_assert_eq!(after.rules(), before.rules());
                    }
                }
                prop_assert!(validate_rule_set(after.rules()).is_ok());
                assert_covers_every_score(&after);
            }
            Ok(())
        })?;
    }
}

// ============================================================
// Concurrent writers and readers
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_are_serialized() {
    let (db, store) = fresh_store().await;
    let store = Arc::new(store);
    let done = Arc::new(AtomicBool::new(false));

    // Readers classify every score against whatever snapshot they get.
    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut last = 0u64;
            while !done.load(Ordering::SeqCst) {
                let set = store.snapshot().await;
                assert!(set.revision() >= last, "snapshot revision went backwards");
                last = set.revision();
                assert_covers_every_score(&set);
                tokio::task::yield_now().await;
            }
        }));
    }

    // Writers race on conflicting edits; half of them are invalid.
    let mut writers = Vec::new();
    for i in 0..32i32 {
        let store = store.clone();
        writers.push(tokio::spawn(async move {
            let cut = 10 + (i * 7) % 80;
            match i % 4 {
                0 => {
                    store
                        .replace_rules(vec![
                            rule("low", 0, cut, ActionTier::Retain),
                            rule("high", cut, 100, ActionTier::Escalate),
                        ])
                        .await
                }
                1 => store.upsert_rule(rule("wedge", cut, cut + 5, ActionTier::Review)).await,
                2 => {
                    store
                        .remove_rule(
                            "high",
                            vec![
                                rule("mid", cut, 90, ActionTier::Review),
                                rule("top", 90, 100, ActionTier::Escalate),
                            ],
                        )
                        .await
                }
                _ => store.reset_to_defaults().await,
            }
        }));
    }

    let mut revisions = Vec::new();
    for writer in writers {
        if let Ok(set) = writer.await.unwrap() {
            assert_covers_every_score(&set);
            revisions.push(set.revision());
        }
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.await.unwrap();
    }

    // Every accepted write got its own revision, with none skipped.
    revisions.sort_unstable();
    let expected: Vec<u64> = (2..2 + revisions.len() as u64).collect();
    assert_eq!(revisions, expected);

    let final_set = store.snapshot().await;
    assert_eq!(final_set.revision(), 1 + revisions.len() as u64);
    assert_eq!(db.rule_set_revision().await.unwrap(), final_set.revision());
    assert_covers_every_score(&final_set);
}
