// Data models: Rust structs that map to database rows.
//
// These are the types that flow through the engine. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest possible score. The rule whose range ends here also contains it.
pub const MAX_SCORE: i32 = 100;

/// The outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionTier {
    Retain,
    Review,
    Escalate,
}

impl ActionTier {
    pub const ALL: [ActionTier; 3] = [ActionTier::Retain, ActionTier::Review, ActionTier::Escalate];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTier::Retain => "RETAIN",
            ActionTier::Review => "REVIEW",
            ActionTier::Escalate => "ESCALATE",
        }
    }
}

impl fmt::Display for ActionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionTier {
    type Err = anyhow::Error;

    /// Case-insensitive, so CLI flags and query strings can use `review`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RETAIN" => Ok(ActionTier::Retain),
            "REVIEW" => Ok(ActionTier::Review),
            "ESCALATE" => Ok(ActionTier::Escalate),
            other => anyhow::bail!("unknown action tier: {other}"),
        }
    }
}

/// What kind of problem an agent thinks the content has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    ExplicitAttack,
    ImplicitAttack,
    UnconsciousAttack,
    Trolling,
    Flooding,
    TrafficDiversion,
    Advertising,
    Normal,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::ExplicitAttack => "explicit_attack",
            ContentCategory::ImplicitAttack => "implicit_attack",
            ContentCategory::UnconsciousAttack => "unconscious_attack",
            ContentCategory::Trolling => "trolling",
            ContentCategory::Flooding => "flooding",
            ContentCategory::TrafficDiversion => "traffic_diversion",
            ContentCategory::Advertising => "advertising",
            ContentCategory::Normal => "normal",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "explicit_attack" => ContentCategory::ExplicitAttack,
            "implicit_attack" => ContentCategory::ImplicitAttack,
            "unconscious_attack" => ContentCategory::UnconsciousAttack,
            "trolling" => ContentCategory::Trolling,
            "flooding" => ContentCategory::Flooding,
            "traffic_diversion" => ContentCategory::TrafficDiversion,
            "advertising" => ContentCategory::Advertising,
            "normal" => ContentCategory::Normal,
            other => anyhow::bail!("unknown content category: {other}"),
        })
    }
}

/// A descriptive label. Tags are identified by name; `color` is a display hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default = "default_tag_color")]
    pub color: String,
}

pub const DEFAULT_TAG_COLOR: &str = "gray";

fn default_tag_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

impl Tag {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_TAG_COLOR)
    }
}

/// A unit of content entering the pipeline. Only `tags` ever changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    pub author_ref: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl ContentItem {
    pub fn new(text: impl Into<String>, author_ref: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            author_ref: author_ref.into(),
            created_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// One agent's opinion of one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent_id: String,
    pub agent_name: String,
    /// 0.0 (benign) to 100.0 (certain violation)
    pub score: f64,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ContentCategory>,
}

/// Why an agent's score is missing from a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnavailableReason {
    Timeout,
    Failed(String),
    NotRegistered,
    InvalidScore(f64),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Timeout => write!(f, "timed out"),
            UnavailableReason::Failed(msg) => write!(f, "failed: {msg}"),
            UnavailableReason::NotRegistered => write!(f, "not registered"),
            UnavailableReason::InvalidScore(v) => write!(f, "score {v} outside [0, 100]"),
        }
    }
}

/// An agent that was asked but did not contribute a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableAgent {
    pub agent_id: String,
    pub reason: UnavailableReason,
}

/// A threshold range mapped to an action tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: String,
    pub label: String,
    /// Inclusive lower bound
    pub min_score: i32,
    /// Exclusive upper bound, except that a rule ending at 100 includes 100
    pub max_score: i32,
    pub action: ActionTier,
    #[serde(default)]
    pub description: String,
    /// Rule-set revision at which this rule was last written (set by the store)
    #[serde(default)]
    pub revision: u64,
}

impl ScoringRule {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        min_score: i32,
        max_score: i32,
        action: ActionTier,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            min_score,
            max_score,
            action,
            description: description.into(),
            revision: 0,
        }
    }

    /// Does this rule's range contain `score`?
    pub fn contains(&self, score: i32) -> bool {
        (score >= self.min_score && score < self.max_score)
            || (score == MAX_SCORE && self.max_score == MAX_SCORE)
    }

    /// Do the half-open ranges of two rules intersect?
    pub fn overlaps(&self, other: &ScoringRule) -> bool {
        self.min_score < other.max_score && other.min_score < self.max_score
    }
}

/// The rule set a fresh store starts with.
pub fn default_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new(
            "1",
            "Retain",
            0,
            40,
            ActionTier::Retain,
            "Content is normal, no action needed",
        ),
        ScoringRule::new("2", "Review", 40, 60, ActionTier::Review, "Needs human review"),
        ScoringRule::new(
            "3",
            "Escalate",
            60,
            100,
            ActionTier::Escalate,
            "Likely violating content",
        ),
    ]
}

/// Immutable audit entry for one classification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRecord {
    pub id: String,
    pub content_id: String,
    /// Content text as it was scored
    pub content_snapshot: String,
    pub author_ref: String,
    pub agent_scores: Vec<AgentScore>,
    pub unavailable_agents: Vec<UnavailableAgent>,
    pub aggregate_score: u8,
    pub action_tier: ActionTier,
    pub rule_id: String,
    pub rule_set_revision: u64,
    /// Name of the aggregation strategy that produced `aggregate_score`
    pub aggregator: String,
    pub category: Option<ContentCategory>,
    pub final_verdict: String,
    pub recorded_at: DateTime<Utc>,
}

impl ScoringRecord {
    /// True when at least one requested agent did not contribute.
    pub fn is_partial(&self) -> bool {
        !self.unavailable_agents.is_empty()
    }
}

/// Ordering for history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filters for history queries. Every field is optional; `None` matches all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub author_ref: Option<String>,
    pub tier: Option<ActionTier>,
    pub content_id: Option<String>,
    /// Inclusive lower bound on `recorded_at`
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `recorded_at`
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: HistoryOrder,
}

/// Keyset position of a record within history ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCursor {
    pub recorded_at: String,
    pub seq: i64,
}

/// Per-tier record counts for dashboards and the status command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub retain: u64,
    pub review: u64,
    pub escalate: u64,
}

impl TierCounts {
    pub fn add(&mut self, tier: ActionTier, count: u64) {
        match tier {
            ActionTier::Retain => self.retain += count,
            ActionTier::Review => self.review += count,
            ActionTier::Escalate => self.escalate += count,
        }
    }

    pub fn get(&self, tier: ActionTier) -> u64 {
        match tier {
            ActionTier::Retain => self.retain,
            ActionTier::Review => self.review,
            ActionTier::Escalate => self.escalate,
        }
    }

    pub fn total(&self) -> u64 {
        self.retain + self.review + self.escalate
    }
}

/// Fixed-width UTC timestamp used for storage, so text ordering is time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_case_insensitive() {
        assert_eq!("review".parse::<ActionTier>().unwrap(), ActionTier::Review);
        assert_eq!("ESCALATE".parse::<ActionTier>().unwrap(), ActionTier::Escalate);
        assert!("delete".parse::<ActionTier>().is_err());
    }

    #[test]
    fn test_tier_serializes_upper_case() {
        let json = serde_json::to_string(&ActionTier::Retain).unwrap();
        assert_eq!(json, r#""RETAIN""#);
    }

    #[test]
    fn test_rule_contains_half_open() {
        let rule = ScoringRule::new("r", "Review", 40, 60, ActionTier::Review, "");
        assert!(rule.contains(40));
        assert!(rule.contains(59));
        assert!(!rule.contains(60));
        assert!(!rule.contains(39));
    }

    #[test]
    fn test_top_rule_includes_100() {
        let rule = ScoringRule::new("r", "Escalate", 60, 100, ActionTier::Escalate, "");
        assert!(rule.contains(100));
        let lower = ScoringRule::new("l", "Review", 40, 60, ActionTier::Review, "");
        assert!(!lower.contains(100));
    }

    #[test]
    fn test_rule_overlap() {
        let a = ScoringRule::new("a", "A", 0, 40, ActionTier::Retain, "");
        let b = ScoringRule::new("b", "B", 40, 60, ActionTier::Review, "");
        let c = ScoringRule::new("c", "C", 30, 50, ActionTier::Review, "");
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let ts = parse_timestamp("2024-03-15T14:30:00Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-15T14:30:00.000000Z");
        let back = parse_timestamp(&format_timestamp(&ts)).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_unavailable_reason_display() {
        assert_eq!(UnavailableReason::Timeout.to_string(), "timed out");
        assert_eq!(
            UnavailableReason::InvalidScore(140.0).to_string(),
            "score 140 outside [0, 100]"
        );
    }
}
