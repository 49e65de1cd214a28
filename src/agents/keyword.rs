// Lexicon-based attack detection.
//
// Each lexicon entry is a term with a weight and the category it signals.
// The score is the sum of the weights of the distinct terms found, capped
// at 100. Terms made of ASCII word characters match on word boundaries;
// other terms (CJK phrases, punctuation) match as plain substrings, since
// regex-lite's \b only understands ASCII words.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::traits::{AgentOpinion, ScoringAgent};
use crate::db::models::{ContentCategory, ContentItem};

/// One flagged term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub term: String,
    /// Points added to the score when the term appears (0 to 100)
    pub weight: f64,
    #[serde(default = "default_category")]
    pub category: ContentCategory,
}

fn default_category() -> ContentCategory {
    ContentCategory::ExplicitAttack
}

impl LexiconEntry {
    pub fn new(term: &str, weight: f64, category: ContentCategory) -> Self {
        Self {
            term: term.to_string(),
            weight,
            category,
        }
    }
}

/// Built-in lexicon used when the settings file doesn't provide one.
pub fn default_lexicon() -> Vec<LexiconEntry> {
    use ContentCategory::*;
    vec![
        LexiconEntry::new("kill yourself", 90.0, ExplicitAttack),
        LexiconEntry::new("i will hurt you", 80.0, ExplicitAttack),
        LexiconEntry::new("idiot", 35.0, ExplicitAttack),
        LexiconEntry::new("moron", 35.0, ExplicitAttack),
        LexiconEntry::new("stupid", 25.0, ExplicitAttack),
        LexiconEntry::new("loser", 25.0, ExplicitAttack),
        LexiconEntry::new("shut up", 20.0, ExplicitAttack),
        LexiconEntry::new("people like you", 20.0, ImplicitAttack),
        LexiconEntry::new("go back to", 25.0, ImplicitAttack),
        LexiconEntry::new("no offense but", 15.0, UnconsciousAttack),
        LexiconEntry::new("triggered", 15.0, Trolling),
        LexiconEntry::new("cope", 15.0, Trolling),
        LexiconEntry::new("差劲", 20.0, UnconsciousAttack),
        LexiconEntry::new("垃圾", 30.0, ExplicitAttack),
    ]
}

struct CompiledTerm {
    entry: LexiconEntry,
    pattern: Regex,
}

/// Scores content by the flagged terms it contains.
pub struct KeywordAgent {
    terms: Vec<CompiledTerm>,
}

impl KeywordAgent {
    pub const ID: &'static str = "keyword";

    /// Compile a lexicon. Entries with empty terms are skipped.
    pub fn new(lexicon: Vec<LexiconEntry>) -> Result<Self> {
        let mut terms = Vec::with_capacity(lexicon.len());
        for entry in lexicon {
            let term = entry.term.trim();
            if term.is_empty() {
                continue;
            }
            let pattern = Regex::new(&term_pattern(term))
                .with_context(|| format!("Invalid lexicon term: {term}"))?;
            terms.push(CompiledTerm { entry, pattern });
        }
        Ok(Self { terms })
    }
}

/// Case-insensitive pattern for a literal term, word-bounded where the
/// term's edges are ASCII word characters.
fn term_pattern(term: &str) -> String {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let leading = term.chars().next().is_some_and(is_word);
    let trailing = term.chars().last().is_some_and(is_word);
    format!(
        "(?i){}{}{}",
        if leading { r"\b" } else { "" },
        regex_lite::escape(term),
        if trailing { r"\b" } else { "" },
    )
}

#[async_trait]
impl ScoringAgent for KeywordAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Keyword lexicon"
    }

    async fn score(&self, item: &ContentItem) -> Result<AgentOpinion> {
        let hits: Vec<&LexiconEntry> = self
            .terms
            .iter()
            .filter(|t| t.pattern.is_match(&item.text))
            .map(|t| &t.entry)
            .collect();

        if hits.is_empty() {
            return Ok(AgentOpinion::new(0.0, "no flagged terms").with_category(ContentCategory::Normal));
        }

        let score = hits.iter().map(|e| e.weight).sum::<f64>().clamp(0.0, 100.0);
        let strongest = hits
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|e| e.category)
            .unwrap_or(ContentCategory::ExplicitAttack);
        let terms: Vec<&str> = hits.iter().map(|e| e.term.as_str()).collect();

        Ok(AgentOpinion::new(score, format!("flagged terms: {}", terms.join(", ")))
            .with_category(strongest))
    }
}
