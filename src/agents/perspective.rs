// Google Perspective API agent.
//
// Perspective analyzes text for toxicity, identity attacks, insults, etc.
// It's free to use but rate-limited (1 QPS on the default quota). Its
// 0.0–1.0 toxicity probability is scaled to the engine's 0–100 range.
//
// API docs: https://developers.perspectiveapi.com/s/about-the-api-methods

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::traits::{AgentOpinion, ScoringAgent};
use crate::db::models::{ContentCategory, ContentItem};
use crate::output::truncate_chars;

pub const DEFAULT_ENDPOINT: &str = "https://commentanalyzer.googleapis.com/v1alpha1";

/// Attribute probability above which the attack is considered explicit.
const EXPLICIT_THRESHOLD: f64 = 0.5;
/// Toxicity probability above which the content is an implicit attack.
const IMPLICIT_THRESHOLD: f64 = 0.3;

pub struct PerspectiveAgent {
    client: Client,
    endpoint: String,
    api_key: String,
    languages: Vec<String>,
    rate_limiter: RateLimiter,
}

impl PerspectiveAgent {
    pub const ID: &'static str = "perspective";

    /// Create an agent with the given API key and request rate.
    pub fn new(api_key: String, requests_per_second: f64) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            languages: Vec::new(),
            rate_limiter: RateLimiter::per_second(requests_per_second),
        }
    }

    /// Restrict analysis to these languages instead of auto-detection.
    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ScoringAgent for PerspectiveAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Perspective API"
    }

    async fn score(&self, item: &ContentItem) -> Result<AgentOpinion> {
        // Respect rate limits before making the call
        self.rate_limiter.acquire().await;

        let url = format!("{}/comments:analyze?key={}", self.endpoint, self.api_key);

        let request = PerspectiveRequest {
            comment: Comment {
                text: item.text.clone(),
            },
            requested_attributes: RequestedAttributes {
                toxicity: AttributeConfig {},
                severe_toxicity: AttributeConfig {},
                identity_attack: AttributeConfig {},
                insult: AttributeConfig {},
                threat: AttributeConfig {},
            },
            languages: self.languages.clone(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to call Perspective API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Perspective API returned {}: {}", status, body);
        }

        let result: PerspectiveResponse = response
            .json()
            .await
            .context("Failed to parse Perspective API response")?;

        let opinion = opinion_from_response(&result);

        debug!(
            content_id = %item.id,
            score = opinion.score,
            text_preview = %truncate_chars(&item.text, 50),
            "Perspective scored content"
        );

        Ok(opinion)
    }
}

/// Convert attribute probabilities into a 0–100 opinion.
fn opinion_from_response(response: &PerspectiveResponse) -> AgentOpinion {
    let toxicity = extract_score(response, "TOXICITY").unwrap_or(0.0);

    let mut attributes: Vec<(&str, f64)> = ["SEVERE_TOXICITY", "IDENTITY_ATTACK", "INSULT", "THREAT"]
        .iter()
        .filter_map(|name| extract_score(response, name).map(|v| (*name, v)))
        .collect();
    attributes.sort_by(|a, b| b.1.total_cmp(&a.1));

    let explicit = attributes.iter().any(|(_, v)| *v >= EXPLICIT_THRESHOLD);
    let category = if explicit {
        ContentCategory::ExplicitAttack
    } else if toxicity >= IMPLICIT_THRESHOLD {
        ContentCategory::ImplicitAttack
    } else {
        ContentCategory::Normal
    };

    let mut rationale = format!("toxicity {toxicity:.2}");
    if let Some((name, value)) = attributes.first() {
        rationale.push_str(&format!(", strongest {} {value:.2}", name.to_lowercase()));
    }

    AgentOpinion::new((toxicity * 100.0).clamp(0.0, 100.0), rationale).with_category(category)
}

/// Extract a specific attribute's summary score from the API response.
fn extract_score(response: &PerspectiveResponse, attribute: &str) -> Option<f64> {
    response
        .attribute_scores
        .get(attribute)
        .map(|score| score.summary_score.value)
}

// --- Perspective API request/response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PerspectiveRequest {
    comment: Comment,
    requested_attributes: RequestedAttributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    languages: Vec<String>,
}

#[derive(Serialize)]
struct Comment {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RequestedAttributes {
    toxicity: AttributeConfig,
    severe_toxicity: AttributeConfig,
    identity_attack: AttributeConfig,
    insult: AttributeConfig,
    threat: AttributeConfig,
}

#[derive(Serialize)]
struct AttributeConfig {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerspectiveResponse {
    attribute_scores: HashMap<String, AttributeScore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeScore {
    summary_score: SummaryScore,
}

#[derive(Deserialize)]
struct SummaryScore {
    value: f64,
}
