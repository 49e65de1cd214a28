// Spam heuristics: flooding, traffic diversion, advertising.
//
// Cheap structural signals that don't need a model. Each signal adds a
// fixed number of points; the category of the largest contributor is
// reported.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use regex_lite::Regex;

use super::traits::{AgentOpinion, ScoringAgent};
use crate::db::models::{ContentCategory, ContentItem};

const LINK_POINTS: f64 = 25.0;
const MAX_LINK_POINTS: f64 = 50.0;
const CONTACT_POINTS: f64 = 30.0;
const AD_PHRASE_POINTS: f64 = 20.0;
const MAX_AD_POINTS: f64 = 40.0;
const CHAR_RUN_POINTS: f64 = 15.0;
const SHOUTING_POINTS: f64 = 15.0;
const REPETITION_POINTS: f64 = 25.0;

/// A run of this many identical characters counts as flooding.
const CHAR_RUN_THRESHOLD: usize = 6;

const CONTACT_PHRASES: &[&str] = &["dm me", "whatsapp", "telegram", "wechat", "加微信", "私聊"];

const AD_PHRASES: &[&str] = &[
    "buy now",
    "discount",
    "promo code",
    "free shipping",
    "limited offer",
    "click here",
    "优惠",
];

struct Signal {
    points: f64,
    category: ContentCategory,
    note: String,
}

pub struct HeuristicAgent {
    link: Regex,
}

impl HeuristicAgent {
    pub const ID: &'static str = "heuristic";

    pub fn new() -> Result<Self> {
        Ok(Self {
            link: Regex::new(r"(?i)(https?://\S+|www\.\S+)")?,
        })
    }

    fn signals(&self, text: &str) -> Vec<Signal> {
        let mut signals = Vec::new();
        let lower = text.to_lowercase();

        let links = self.link.find_iter(text).count();
        if links > 0 {
            signals.push(Signal {
                points: (links as f64 * LINK_POINTS).min(MAX_LINK_POINTS),
                category: ContentCategory::TrafficDiversion,
                note: format!("{links} link(s)"),
            });
        }

        if let Some(phrase) = CONTACT_PHRASES.iter().find(|p| lower.contains(*p)) {
            signals.push(Signal {
                points: CONTACT_POINTS,
                category: ContentCategory::TrafficDiversion,
                note: format!("off-platform contact ({phrase})"),
            });
        }

        let ads: Vec<&str> = AD_PHRASES
            .iter()
            .copied()
            .filter(|p| lower.contains(p))
            .collect();
        if !ads.is_empty() {
            signals.push(Signal {
                points: (ads.len() as f64 * AD_PHRASE_POINTS).min(MAX_AD_POINTS),
                category: ContentCategory::Advertising,
                note: format!("ad phrases ({})", ads.join(", ")),
            });
        }

        let run = longest_char_run(text);
        if run >= CHAR_RUN_THRESHOLD {
            signals.push(Signal {
                points: CHAR_RUN_POINTS,
                category: ContentCategory::Flooding,
                note: format!("{run} repeated characters"),
            });
        }

        if is_shouting(text) {
            signals.push(Signal {
                points: SHOUTING_POINTS,
                category: ContentCategory::Flooding,
                note: "mostly upper case".to_string(),
            });
        }

        if is_repetitive(&lower) {
            signals.push(Signal {
                points: REPETITION_POINTS,
                category: ContentCategory::Flooding,
                note: "repeated words".to_string(),
            });
        }

        signals
    }
}

/// Length of the longest run of one repeated non-whitespace character.
fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut last: Option<char> = None;
    for c in text.chars() {
        if Some(c) == last && !c.is_whitespace() {
            current += 1;
        } else {
            current = 1;
        }
        last = Some(c);
        longest = longest.max(current);
    }
    longest
}

/// At least 10 letters, more than 70% of them upper case.
fn is_shouting(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 10 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64 > 0.7
}

/// At least 8 words, fewer than 30% of them distinct.
fn is_repetitive(lower: &str) -> bool {
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() < 8 {
        return false;
    }
    let distinct: HashSet<&str> = words.iter().copied().collect();
    (distinct.len() as f64) / (words.len() as f64) < 0.3
}

#[async_trait]
impl ScoringAgent for HeuristicAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Spam heuristics"
    }

    async fn score(&self, item: &ContentItem) -> Result<AgentOpinion> {
        let signals = self.signals(&item.text);
        if signals.is_empty() {
            return Ok(AgentOpinion::new(0.0, "no spam signals").with_category(ContentCategory::Normal));
        }

        let score = signals.iter().map(|s| s.points).sum::<f64>().min(100.0);
        let category = signals
            .iter()
            .max_by(|a, b| a.points.total_cmp(&b.points))
            .map(|s| s.category)
            .unwrap_or(ContentCategory::Flooding);
        let notes: Vec<&str> = signals.iter().map(|s| s.note.as_str()).collect();

        Ok(AgentOpinion::new(score, notes.join("; ")).with_category(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn score(text: &str) -> AgentOpinion {
        let agent = HeuristicAgent::new().unwrap();
        agent.score(&ContentItem::new(text, "tester")).await.unwrap()
    }

    #[tokio::test]
    async fn test_plain_text_has_no_signals() {
        let opinion = score("I disagree with the new release notes.").await;
        assert_eq!(opinion.score, 0.0);
        assert_eq!(opinion.category, Some(ContentCategory::Normal));
    }

    #[tokio::test]
    async fn test_links_and_contact_are_traffic_diversion() {
        let opinion = score("Everyone should look at https://example.com and DM me").await;
        assert!((opinion.score - 55.0).abs() < f64::EPSILON);
        assert_eq!(opinion.category, Some(ContentCategory::TrafficDiversion));
    }

    #[tokio::test]
    async fn test_link_points_are_capped() {
        let opinion = score("http://a.example http://b.example http://c.example").await;
        assert!((opinion.score - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_ads_are_advertising() {
        let opinion = score("Huge discount today, buy now with promo code SAVE").await;
        assert!((opinion.score - 40.0).abs() < f64::EPSILON);
        assert_eq!(opinion.category, Some(ContentCategory::Advertising));
    }

    #[tokio::test]
    async fn test_flooding_signals() {
        let opinion = score("spam spam spam spam spam spam spam spam spam").await;
        assert_eq!(opinion.category, Some(ContentCategory::Flooding));
        assert!((opinion.score - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_longest_char_run() {
        assert_eq!(longest_char_run("heyyyyyyy"), 7);
        assert_eq!(longest_char_run("abc"), 1);
        assert_eq!(longest_char_run(""), 0);
        assert_eq!(longest_char_run("a      b"), 1);
    }

    #[test]
    fn test_is_shouting() {
        assert!(is_shouting("THIS IS ABSOLUTELY OUTRAGEOUS"));
        assert!(!is_shouting("OK FINE"));
        assert!(!is_shouting("This is a normal sentence"));
    }
}
