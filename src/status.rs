// System status display: database, rule set, decision counts, spool.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::db::models::TierCounts;
use crate::engine::Engine;

/// Point-in-time engine summary, shared by `verdict status` and the web API.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub rule_set_revision: u64,
    pub rule_count: usize,
    pub rules_valid: bool,
    pub tier_counts: TierCounts,
    pub pending_records: usize,
    pub agents: Vec<String>,
    pub default_agents: Vec<String>,
    pub aggregator: String,
}

pub async fn collect(engine: &Engine) -> Result<StatusReport> {
    let rules = engine.rule_set().await;
    Ok(StatusReport {
        rule_set_revision: rules.revision(),
        rule_count: rules.rules().len(),
        rules_valid: rules.is_valid(),
        tier_counts: engine.tier_counts().await?,
        pending_records: engine.pending_count().await?,
        agents: engine.agent_ids(),
        default_agents: engine.default_agents().to_vec(),
        aggregator: engine.aggregator_name().to_string(),
    })
}

/// Display system status to the terminal.
pub async fn show(engine: &Engine, db_display_path: &str) -> Result<()> {
    // Database file size
    let file_size = std::fs::metadata(Path::new(db_display_path))
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);

    let report = collect(engine).await?;

    println!(
        "Rules: {} at revision {}{}",
        report.rule_count,
        report.rule_set_revision,
        if report.rules_valid {
            ""
        } else {
            " (INVALID: scores are not fully covered, run `verdict rules list`)"
        }
    );

    let counts = report.tier_counts;
    println!(
        "Decisions: {} total ({} retain, {} review, {} escalate)",
        counts.total(),
        counts.retain,
        counts.review,
        counts.escalate
    );

    if report.pending_records > 0 {
        println!(
            "Spooled records: {} waiting (run `verdict replay`)",
            report.pending_records
        );
    } else {
        println!("Spooled records: none");
    }

    println!(
        "Agents: {} registered, default {} ({} aggregation)",
        report.agents.join(", "),
        report.default_agents.join(", "),
        report.aggregator
    );

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
