// Scoring: turn collected agent scores into an action tier.
//
// Both halves are pure and synchronous: aggregation reduces the scores to
// one integer, classification looks that integer up in a rule snapshot.

pub mod aggregate;
pub mod classify;

pub use aggregate::{aggregator_from_settings, Aggregator, MeanAggregator};
pub use classify::{classify, Classification, Decision};
