// Scoring agents: trait-based abstraction for independent scorers.
//
// The ScoringAgent trait defines the interface. The built-in agents are a
// keyword lexicon, spam heuristics, and Google's Perspective API; anything
// else (an ML service, a human reviewer's manual score) plugs in the same
// way. The collector fans a content item out to the configured agents.

pub mod collector;
pub mod heuristic;
pub mod keyword;
pub mod perspective;
pub mod rate_limiter;
pub mod traits;

pub use collector::{Collection, ScoreCollector};
pub use traits::{AgentOpinion, ScoringAgent};
