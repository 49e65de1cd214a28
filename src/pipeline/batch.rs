// Batch pipeline: score many content items from one input.
//
// Each line of the input is one item, either plain text (attributed to the
// default author) or a JSON object {"text": ..., "author": ...}. Items are
// ingested and scored with bounded concurrency; a failing item is logged
// and counted, never fatal for the batch.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::models::{ActionTier, ScoringRecord};
use crate::engine::Engine;

/// One line of batch input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchItem {
    pub text: String,
    #[serde(default, alias = "author_ref")]
    pub author: Option<String>,
}

/// Outcome counts for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub scored: usize,
    pub failed: usize,
    pub per_tier: BTreeMap<String, usize>,
}

impl BatchSummary {
    fn add(&mut self, record: &ScoringRecord) {
        self.scored += 1;
        *self
            .per_tier
            .entry(record.action_tier.to_string())
            .or_default() += 1;
    }

    pub fn tier(&self, tier: ActionTier) -> usize {
        self.per_tier.get(tier.as_str()).copied().unwrap_or(0)
    }
}

/// Parse batch input. Blank lines are skipped.
pub fn parse_input(contents: &str, default_author: &str) -> Result<Vec<(String, String)>> {
    let mut items = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('{') {
            let item: BatchItem = serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", n + 1))?;
            let author = item.author.unwrap_or_else(|| default_author.to_string());
            items.push((item.text, author));
        } else {
            items.push((line.to_string(), default_author.to_string()));
        }
    }
    Ok(items)
}

/// Score every item. Returns per-tier counts of what was recorded.
pub async fn run(
    engine: &Engine,
    items: Vec<(String, String)>,
    agent_ids: &[String],
    concurrency: usize,
    show_progress: bool,
) -> BatchSummary {
    let pb = if show_progress {
        let pb = ProgressBar::new(items.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("  Scoring [{bar:30}] {pos}/{len} ({eta})") {
            pb.set_style(style);
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut results = stream::iter(items.into_iter().map(|(text, author)| async move {
        let item = engine.ingest(&text, &author).await?;
        engine.score_content(&item, agent_ids).await
    }))
    .buffer_unordered(concurrency.max(1));

    let mut summary = BatchSummary::default();
    while let Some(result) = results.next().await {
        match result {
            Ok(record) => summary.add(&record),
            Err(e) => {
                warn!(error = %e, "Failed to score item, skipping");
                summary.failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        scored = summary.scored,
        failed = summary.failed,
        "Batch complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_json_lines() {
        let input = "first line\n\n{\"text\": \"second\", \"author\": \"bob\"}\n{\"text\": \"third\"}\n";
        let items = parse_input(input, "anon").unwrap();
        assert_eq!(
            items,
            vec![
                ("first line".to_string(), "anon".to_string()),
                ("second".to_string(), "bob".to_string()),
                ("third".to_string(), "anon".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_reports_bad_json_line() {
        let err = parse_input("ok\n{\"text\": }", "anon").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
