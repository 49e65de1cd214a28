use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use verdict::config::Config;
use verdict::db::models::{parse_timestamp, ActionTier, HistoryFilter, HistoryOrder, ScoringRule, Tag};
use verdict::db::Database;
use verdict::output::terminal;
use verdict::pipeline::batch;
use verdict::Engine;

/// verdict: content risk scoring and classification.
///
/// Scores content with independent agents, classifies the aggregate score
/// into an action tier using configurable rules, and keeps an audit record
/// of every decision.
#[derive(Parser)]
#[command(name = "verdict", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and seed the default rules
    Init,

    /// Show or change the scoring rules
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },

    /// Score one piece of text and record the decision
    Score {
        /// The text to score
        text: String,

        /// Author reference stored with the content
        #[arg(long, default_value = "cli")]
        author: String,

        /// Comma-separated agent ids (default: enabled_agents from settings)
        #[arg(long, value_delimiter = ',')]
        agents: Option<Vec<String>>,
    },

    /// Score every line of a file (plain text or JSON objects)
    Batch {
        file: PathBuf,

        /// Author for lines that don't name one
        #[arg(long, default_value = "batch")]
        author: String,

        /// Number of items to score in parallel (default: 8)
        #[arg(long, default_value = "8")]
        concurrency: usize,

        /// Comma-separated agent ids (default: enabled_agents from settings)
        #[arg(long, value_delimiter = ',')]
        agents: Option<Vec<String>>,
    },

    /// List recorded decisions, newest first
    History {
        #[arg(long)]
        author: Option<String>,

        /// retain, review, or escalate
        #[arg(long)]
        tier: Option<ActionTier>,

        /// Only records at or after this RFC 3339 time
        #[arg(long)]
        since: Option<String>,

        /// Only records before this RFC 3339 time
        #[arg(long)]
        until: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        oldest_first: bool,
    },

    /// Show one recorded decision in full
    Record { id: String },

    /// Attach a tag to a content item
    Tag {
        content_id: String,
        name: String,

        #[arg(long, default_value = "gray")]
        color: String,
    },

    /// Show the tags on a content item
    Tags { content_id: String },

    /// Write spooled history records to the database
    Replay,

    /// Show system status (rules, decision counts, spool)
    Status,

    /// Run the JSON API server
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "3000")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List the active rules
    List,

    /// Insert or update a rule (must not overlap or leave a gap)
    Set {
        id: String,

        #[arg(long)]
        label: String,

        #[arg(long)]
        min: i32,

        #[arg(long)]
        max: i32,

        /// retain, review, or escalate
        #[arg(long)]
        action: ActionTier,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Remove a rule, optionally replacing it in the same write
    Remove {
        id: String,

        /// JSON file with an array of replacement rules
        #[arg(long)]
        replacements: Option<PathBuf>,
    },

    /// Replace the whole rule set from a JSON file
    Replace { file: PathBuf },

    /// Restore the default rules
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("verdict=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing verdict database...");
            let config = Config::load()?;
            let db = verdict::db::initialize_sqlite(&config.db_path)?;
            let table_count = db.table_count().await?;
            let engine = Engine::from_config(&config, db).await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("Rule set revision: {}", engine.rule_set().await.revision());
            println!("\nverdict is ready. Try: verdict score \"some text\"");
        }

        Commands::Rules { action } => {
            let (_config, engine) = open_engine().await?;
            run_rules(&engine, action).await?;
        }

        Commands::Score {
            text,
            author,
            agents,
        } => {
            let (_config, engine) = open_engine().await?;
            let handle = engine.submit_with_agents(&text, &author, agents).await?;
            println!("Content {}", handle.content_id().dimmed());
            let record = handle.wait().await?;
            terminal::display_record(&record);
        }

        Commands::Batch {
            file,
            author,
            concurrency,
            agents,
        } => {
            let (_config, engine) = open_engine().await?;
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items = batch::parse_input(&contents, &author)?;
            if items.is_empty() {
                println!("Nothing to score in {}.", file.display());
                return Ok(());
            }
            let agents = agents.unwrap_or_else(|| engine.default_agents().to_vec());
            println!(
                "Scoring {} items ({} concurrent)...",
                items.len(),
                concurrency
            );
            let summary = batch::run(&engine, items, &agents, concurrency, true).await;
            terminal::display_batch_summary(&summary);
        }

        Commands::History {
            author,
            tier,
            since,
            until,
            limit,
            oldest_first,
        } => {
            let (_config, engine) = open_engine().await?;
            let filter = HistoryFilter {
                author_ref: author,
                tier,
                content_id: None,
                since: since.as_deref().map(parse_timestamp).transpose()?,
                until: until.as_deref().map(parse_timestamp).transpose()?,
                order: if oldest_first {
                    HistoryOrder::OldestFirst
                } else {
                    HistoryOrder::NewestFirst
                },
            };
            let records = engine.get_history(filter, Some(limit)).await?;
            terminal::display_history(&records);
        }

        Commands::Record { id } => {
            let (_config, engine) = open_engine().await?;
            let record = engine.get_record(&id).await?;
            terminal::display_record(&record);
        }

        Commands::Tag {
            content_id,
            name,
            color,
        } => {
            let (_config, engine) = open_engine().await?;
            let attached = engine
                .attach_tag(&content_id, &Tag::new(name.as_str(), color))
                .await?;
            if attached {
                println!("Tagged {content_id} with {}", name.bold());
            } else {
                println!("{content_id} already has tag {}", name.bold());
            }
            let tags = engine.get_tags(&content_id).await?;
            terminal::display_tags(&content_id, &tags);
        }

        Commands::Tags { content_id } => {
            let (_config, engine) = open_engine().await?;
            let tags = engine.get_tags(&content_id).await?;
            terminal::display_tags(&content_id, &tags);
        }

        Commands::Replay => {
            let (_config, engine) = open_engine().await?;
            let replayed = engine.replay_pending().await?;
            let remaining = engine.pending_count().await?;
            println!("Replayed {replayed} records, {remaining} still pending");
        }

        Commands::Status => {
            let config = Config::load()?;
            if !std::path::Path::new(&config.db_path).exists() {
                println!("Database: not initialized");
                println!("\nRun `verdict init` to set up the database.");
                return Ok(());
            }
            let db = verdict::db::open_sqlite(&config.db_path)?;
            let engine = Engine::from_config(&config, db).await?;
            verdict::status::show(&engine, &config.db_path).await?;
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let (_config, engine) = open_engine().await?;
            verdict::web::run_server(engine, port, &bind).await?;
        }
    }

    Ok(())
}

async fn run_rules(engine: &Engine, action: RulesCommand) -> Result<()> {
    let set = match action {
        RulesCommand::List => engine.rule_set().await,
        RulesCommand::Set {
            id,
            label,
            min,
            max,
            action,
            description,
        } => {
            engine
                .upsert_rule(ScoringRule::new(id, label, min, max, action, description))
                .await?
        }
        RulesCommand::Remove { id, replacements } => {
            let replacements = match replacements {
                Some(path) => read_rules_file(&path)?,
                None => Vec::new(),
            };
            engine.remove_rule(&id, replacements).await?
        }
        RulesCommand::Replace { file } => engine.replace_rules(read_rules_file(&file)?).await?,
        RulesCommand::Reset => engine.reset_rules().await?,
    };

    if !set.is_valid() {
        println!(
            "{}",
            "Warning: the active rules don't cover every score. Fix them with `verdict rules replace`."
                .yellow()
        );
    }
    terminal::display_rules(set.revision(), set.rules());
    Ok(())
}

fn read_rules_file(path: &std::path::Path) -> Result<Vec<ScoringRule>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid rules JSON in {}", path.display()))
}

/// Open the existing database and wire the engine from configuration.
async fn open_engine() -> Result<(Config, Engine)> {
    let config = Config::load()?;
    let db: Arc<dyn Database> = verdict::db::open_sqlite(&config.db_path)?;
    let engine = Engine::from_config(&config, db).await?;
    Ok((config, engine))
}
