use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::heuristic::HeuristicAgent;
use crate::agents::keyword::{default_lexicon, KeywordAgent, LexiconEntry};
use crate::agents::perspective::PerspectiveAgent;
use crate::agents::collector::DEFAULT_AGENT_TIMEOUT;
use crate::agents::ScoreCollector;
use crate::scoring::{aggregator_from_settings, Aggregator};
use crate::tagging::{AutoTagger, TagRule};

/// Tunable engine behavior, read from the optional JSON settings file.
///
/// Every field has a default, so a settings file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Agent ids asked to score each item when the caller doesn't choose
    pub enabled_agents: Vec<String>,
    /// Per-agent time budget
    pub agent_timeout_ms: u64,
    /// "mean", "max", or "weighted_mean"
    pub aggregator: String,
    /// Per-agent weights for the weighted mean (unlisted agents weigh 1.0)
    pub agent_weights: HashMap<String, f64>,
    /// Apply `tag_rules` to content on submission
    pub auto_tag: bool,
    /// Replaces the built-in keyword lexicon when present
    pub keyword_lexicon: Option<Vec<LexiconEntry>>,
    pub tag_rules: Vec<TagRule>,
    /// Perspective API request rate (the default quota is 1 QPS)
    pub perspective_qps: f64,
    /// Languages to ask Perspective for; empty means auto-detect
    pub perspective_languages: Vec<String>,
    /// Overrides the public Perspective endpoint (proxies, test servers)
    pub perspective_endpoint: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled_agents: vec![KeywordAgent::ID.to_string(), HeuristicAgent::ID.to_string()],
            agent_timeout_ms: DEFAULT_AGENT_TIMEOUT.as_millis() as u64,
            aggregator: "mean".to_string(),
            agent_weights: HashMap::new(),
            auto_tag: true,
            keyword_lexicon: None,
            tag_rules: Vec::new(),
            perspective_qps: 1.0,
            perspective_languages: Vec::new(),
            perspective_endpoint: None,
        }
    }
}

impl EngineSettings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms.max(1))
    }
}

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    pub db_path: String,
    /// Where history records wait when the store is unavailable.
    /// `None` keeps them in memory for the life of the process.
    pub spool_path: Option<PathBuf>,
    pub perspective_api_key: String,
    pub settings: EngineSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// VERDICT_AGENT_TIMEOUT_MS and VERDICT_AGGREGATOR override the
    /// corresponding keys of the settings file.
    pub fn load() -> Result<Self> {
        let mut settings = match env::var("VERDICT_SETTINGS") {
            Ok(path) if !path.is_empty() => EngineSettings::from_file(Path::new(&path))?,
            _ => EngineSettings::default(),
        };

        if let Ok(raw) = env::var("VERDICT_AGENT_TIMEOUT_MS") {
            settings.agent_timeout_ms = raw
                .parse()
                .with_context(|| format!("VERDICT_AGENT_TIMEOUT_MS is not a number: {raw}"))?;
        }
        if let Ok(aggregator) = env::var("VERDICT_AGGREGATOR") {
            settings.aggregator = aggregator;
        }

        let spool_path = match env::var("VERDICT_SPOOL_PATH") {
            Ok(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => default_spool_path(),
        };

        Ok(Self {
            db_path: env::var("VERDICT_DB_PATH").unwrap_or_else(|_| "./verdict.db".to_string()),
            spool_path,
            perspective_api_key: env::var("PERSPECTIVE_API_KEY").unwrap_or_default(),
            settings,
        })
    }

    /// Check that the Perspective API key is configured.
    pub fn require_perspective(&self) -> Result<()> {
        if self.perspective_api_key.is_empty() {
            anyhow::bail!(
                "PERSPECTIVE_API_KEY not set, but the perspective agent is enabled.\n\
                 Add the key to your .env file or remove \"perspective\" from enabled_agents."
            );
        }
        Ok(())
    }

    /// Register the built-in agents.
    ///
    /// The Perspective agent is only registered when an API key is present;
    /// enabling it without one is a configuration error.
    pub fn build_collector(&self) -> Result<ScoreCollector> {
        let lexicon = self
            .settings
            .keyword_lexicon
            .clone()
            .unwrap_or_else(default_lexicon);

        let mut collector = ScoreCollector::new(self.settings.agent_timeout())
            .with_agent(Arc::new(KeywordAgent::new(lexicon)?))
            .with_agent(Arc::new(HeuristicAgent::new()?));

        let wants_perspective = self
            .settings
            .enabled_agents
            .iter()
            .any(|id| id == PerspectiveAgent::ID);
        if wants_perspective {
            self.require_perspective()?;
        }
        if !self.perspective_api_key.is_empty() {
            let mut agent =
                PerspectiveAgent::new(self.perspective_api_key.clone(), self.settings.perspective_qps)
                    .with_languages(self.settings.perspective_languages.clone());
            if let Some(endpoint) = &self.settings.perspective_endpoint {
                agent = agent.with_endpoint(endpoint.as_str());
            }
            collector.register(Arc::new(agent));
        }

        info!(agents = ?collector.agent_ids(), "Scoring agents registered");
        Ok(collector)
    }

    pub fn build_aggregator(&self) -> Result<Box<dyn Aggregator>> {
        aggregator_from_settings(&self.settings.aggregator, &self.settings.agent_weights)
    }

    pub fn build_auto_tagger(&self) -> AutoTagger {
        if self.settings.auto_tag {
            AutoTagger::new(self.settings.tag_rules.clone())
        } else {
            AutoTagger::default()
        }
    }
}

/// Default spool location under the platform data directory.
fn default_spool_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("verdict").join("pending.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(settings: EngineSettings, key: &str) -> Config {
        Config {
            db_path: ":memory:".to_string(),
            spool_path: None,
            perspective_api_key: key.to_string(),
            settings,
        }
    }

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"aggregator": "max", "agent_timeout_ms": 250}"#).unwrap();
        assert_eq!(settings.aggregator, "max");
        assert_eq!(settings.agent_timeout(), Duration::from_millis(250));
        assert_eq!(settings.enabled_agents, vec!["keyword", "heuristic"]);
        assert!(settings.auto_tag);
    }

    #[test]
    fn test_settings_parse_lexicon_and_tag_rules() {
        let settings: EngineSettings = serde_json::from_str(
            r#"{
                "keyword_lexicon": [{"term": "scam", "weight": 40, "category": "traffic_diversion"}],
                "tag_rules": [{"tag": "ads", "keywords": ["discount"]}]
            }"#,
        )
        .unwrap();
        let lexicon = settings.keyword_lexicon.unwrap();
        assert_eq!(lexicon[0].term, "scam");
        assert_eq!(settings.tag_rules[0].color, "gray");
    }

    #[test]
    fn test_collector_without_perspective_key() {
        let collector = config(EngineSettings::default(), "").build_collector().unwrap();
        assert_eq!(collector.agent_ids(), vec!["heuristic", "keyword"]);
    }

    #[test]
    fn test_perspective_enabled_without_key_fails() {
        let settings = EngineSettings {
            enabled_agents: vec!["perspective".to_string()],
            ..Default::default()
        };
        assert!(config(settings, "").build_collector().is_err());
    }

    #[test]
    fn test_perspective_registered_with_key() {
        let collector = config(EngineSettings::default(), "test-key").build_collector().unwrap();
        assert!(collector.agent_ids().contains(&"perspective".to_string()));
    }

    #[test]
    fn test_auto_tag_disabled() {
        let settings = EngineSettings {
            auto_tag: false,
            tag_rules: vec![TagRule {
                tag: "ads".to_string(),
                color: "gray".to_string(),
                keywords: vec!["sale".to_string()],
            }],
            ..Default::default()
        };
        assert!(config(settings, "").build_auto_tagger().is_empty());
    }
}
