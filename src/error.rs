// Engine error taxonomy.
//
// Store and CLI plumbing uses anyhow; everything that crosses the engine's
// boundary is an EngineError so callers can tell a bad rule from a missing
// record from a broken rule set.

/// Reasons a rule, rule set, content item, or history record is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("rule {id}: min_score {min} must be below max_score {max}")]
    EmptyRange { id: String, min: i32, max: i32 },

    #[error("rule {id}: range [{min}, {max}) falls outside [0, 100]")]
    OutOfBounds { id: String, min: i32, max: i32 },

    #[error("rule {id} overlaps rule {other}")]
    Overlap { id: String, other: String },

    #[error("scores [{from}, {to}) are not covered by any rule")]
    Gap { from: i32, to: i32 },

    #[error("rule set must contain at least one rule")]
    EmptyRuleSet,

    #[error("duplicate rule id: {0}")]
    DuplicateId(String),

    #[error("rule id must not be empty")]
    MissingId,

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("content text is empty")]
    EmptyContent,
}

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("no agent scores available; content remains unclassified")]
    NoData,

    #[error("rule set revision {revision} has {matches} rules matching score {score}")]
    InvariantViolation {
        score: u8,
        revision: u64,
        matches: usize,
    },

    #[error("agent {agent_id} unavailable: {reason}")]
    AgentUnavailable { agent_id: String, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("pipeline cancelled before recording")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
