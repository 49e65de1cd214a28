// Tagging: descriptive labels on content, independent of scoring.
//
// Tags are identified by name. Attaching a tag that's already present is a
// no-op, not an error. The auto-tagger suggests tags from configured
// keyword rules; it never influences a score or a tier.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::{ContentItem, Tag, DEFAULT_TAG_COLOR};
use crate::db::Database;
use crate::error::{EngineError, Result, ValidationError};

pub struct TagService {
    db: Arc<dyn Database>,
}

impl TagService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Attach `tag` to a content item. Returns false if a tag with the same
    /// name was already attached.
    pub async fn attach_tag(&self, content_id: &str, tag: &Tag) -> Result<bool> {
        let name = tag.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MalformedRecord("tag name is empty".to_string()).into());
        }
        if !self.db.content_exists(content_id).await? {
            return Err(EngineError::not_found("content", content_id));
        }

        let tag = Tag::new(name, tag.color.clone());
        let attached = self.db.attach_tag(content_id, &tag).await?;
        debug!(content_id, tag = %tag.name, attached, "Attach tag");
        Ok(attached)
    }

    /// Tags on a content item, in the order they were attached.
    pub async fn get_tags(&self, content_id: &str) -> Result<Vec<Tag>> {
        if !self.db.content_exists(content_id).await? {
            return Err(EngineError::not_found("content", content_id));
        }
        Ok(self.db.get_tags(content_id).await?)
    }
}

/// Tag content whose text mentions any of `keywords` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub keywords: Vec<String>,
}

fn default_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct AutoTagger {
    rules: Vec<TagRule>,
}

impl AutoTagger {
    pub fn new(rules: Vec<TagRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.tag = rule.tag.trim().to_string();
                rule.keywords = rule
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                rule
            })
            .filter(|rule| !rule.tag.is_empty() && !rule.keywords.is_empty())
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tags suggested for `item`, each at most once, excluding tags it
    /// already carries.
    pub fn suggest(&self, item: &ContentItem) -> Vec<Tag> {
        let text = item.text.to_lowercase();
        let mut suggested: Vec<Tag> = Vec::new();
        for rule in &self.rules {
            let hit = rule.keywords.iter().any(|k| text.contains(k.as_str()));
            if hit
                && !item.has_tag(&rule.tag)
                && !suggested.iter().any(|t| t.name == rule.tag)
            {
                suggested.push(Tag::new(rule.tag.clone(), rule.color.clone()));
            }
        }
        suggested
    }
}
