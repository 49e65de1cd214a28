// Colored terminal output for rules, records, and tags.
//
// This module handles all terminal-specific formatting: colors, tables,
// summaries. The main.rs command handlers delegate here.

use colored::Colorize;

use crate::db::models::{ActionTier, ScoringRecord, ScoringRule, Tag};
use crate::pipeline::batch::BatchSummary;

/// Display the active rule set as a table.
pub fn display_rules(revision: u64, rules: &[ScoringRule]) {
    println!(
        "\n{}",
        format!("=== Scoring Rules (revision {revision}) ===").bold()
    );
    println!();
    println!(
        "  {:<8} {:<16} {:<10} {:<10}  {}",
        "Id".dimmed(),
        "Label".dimmed(),
        "Range".dimmed(),
        "Action".dimmed(),
        "Description".dimmed(),
    );
    println!("  {}", "-".repeat(72).dimmed());

    for rule in rules {
        println!(
            "  {:<8} {:<16} {:<10} {:<10}  {}",
            rule.id,
            super::truncate_chars(&rule.label, 16),
            format_range(rule),
            colorize_tier(rule.action),
            rule.description.dimmed(),
        );
    }
    println!();
}

/// "[40, 60)", or "[60, 100]" for the rule that includes the top score.
pub fn format_range(rule: &ScoringRule) -> String {
    let close = if rule.max_score == 100 { ']' } else { ')' };
    format!("[{}, {}{close}", rule.min_score, rule.max_score)
}

/// Display one decision in full.
pub fn display_record(record: &ScoringRecord) {
    println!(
        "\n{}",
        format!("=== Record {} ===", record.id).bold()
    );
    println!(
        "  Verdict: {} ({}/100)",
        colorize_tier(record.action_tier),
        record.aggregate_score
    );
    println!("  {}", record.final_verdict);
    println!(
        "  Rule {} at revision {}, aggregated by {}",
        record.rule_id, record.rule_set_revision, record.aggregator
    );
    if let Some(category) = record.category {
        println!("  Category: {category}");
    }
    println!("  Author: {}", record.author_ref);
    println!("  Content: {}", super::truncate_chars(&record.content_snapshot, 120).dimmed());
    println!("  Recorded: {}", record.recorded_at.format("%Y-%m-%d %H:%M:%S UTC"));

    if !record.agent_scores.is_empty() {
        println!("\n  Agent scores:");
        for score in &record.agent_scores {
            println!(
                "    {:<20} {:>5.1}  {}",
                score.agent_name,
                score.score,
                super::truncate_chars(&score.rationale, 80).dimmed()
            );
        }
    }
    if !record.unavailable_agents.is_empty() {
        println!("\n  {}", "Unavailable agents:".yellow());
        for agent in &record.unavailable_agents {
            println!("    {:<20} {}", agent.agent_id, agent.reason);
        }
    }
    println!();
}

/// Display a history listing, one line per record.
pub fn display_history(records: &[ScoringRecord]) {
    if records.is_empty() {
        println!("No scoring records match. Score something with `verdict score` first.");
        return;
    }

    println!(
        "\n{}",
        format!("=== History ({} records) ===", records.len()).bold()
    );
    println!();
    println!(
        "  {:<20} {:<10} {:>5}  {:<16} {}",
        "Recorded".dimmed(),
        "Tier".dimmed(),
        "Score".dimmed(),
        "Author".dimmed(),
        "Content".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());

    for record in records {
        let partial = if record.is_partial() { " *" } else { "" };
        println!(
            "  {:<20} {:<10} {:>5}{partial}  {:<16} {}",
            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            colorize_tier(record.action_tier),
            record.aggregate_score,
            super::truncate_chars(&record.author_ref, 16),
            super::truncate_chars(&record.content_snapshot, 60).dimmed(),
        );
    }
    println!();

    if records.iter().any(|r| r.is_partial()) {
        println!("  {} scored with some agents unavailable", "*".yellow());
    }
}

/// Display the tags attached to a content item.
pub fn display_tags(content_id: &str, tags: &[Tag]) {
    if tags.is_empty() {
        println!("No tags on {content_id}.");
        return;
    }
    let names: Vec<String> = tags
        .iter()
        .map(|t| format!("{} ({})", t.name.bold(), t.color))
        .collect();
    println!("Tags on {content_id}: {}", names.join(", "));
}

/// Display per-tier counts after a batch run.
pub fn display_batch_summary(summary: &BatchSummary) {
    println!(
        "\nScored {} items ({} failed)",
        summary.scored, summary.failed
    );
    for tier in ActionTier::ALL {
        let count = summary.tier(tier);
        if count > 0 {
            println!("  {:<10} {}", colorize_tier(tier), count);
        }
    }
}

/// Colorize an action tier.
pub fn colorize_tier(tier: ActionTier) -> colored::ColoredString {
    match tier {
        ActionTier::Escalate => tier.as_str().red().bold(),
        ActionTier::Review => tier.as_str().yellow(),
        ActionTier::Retain => tier.as_str().green(),
    }
}
