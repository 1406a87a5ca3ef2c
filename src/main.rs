use anyhow::{Context, Result};
use blendsphere_srs::database::db;
use blendsphere_srs::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blendsphere-srs", version, about = "Spaced repetition scheduling for BlendSphere decks")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Overrides the database path from the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    /// Bearer token for the remote scoring service
    #[arg(long, env = "BLENDSPHERE_SRS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a sample deck with a few new cards
    Seed {
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "Polish Vocabulary")]
        name: String,
        #[arg(long, default_value_t = 3)]
        cards: usize,
    },
    /// List cards due for review
    Due {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        deck: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Count cards due for review
    Count {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        deck: Option<String>,
    },
    /// Rate a card: again, hard, good, easy (or 1-4)
    Review { card_id: String, rating: Rating },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }
    if cli.token.is_some() {
        config.remote.bearer_token = cli.token;
    }

    tracing::info!(database = %config.storage.database_path.display(), "Opening card store");
    let store = Arc::new(
        SqliteCardStore::open(&config.storage.database_path).context("Failed to open database")?,
    );

    match cli.command {
        Command::Seed { owner, name, cards } => {
            let deck = store.with_connection(|conn| {
                let deck_id = db::new_deck(&owner, &name, conn)?;
                for _ in 0..cards {
                    db::add_card(&deck_id, conn)?;
                }
                Ok(deck_id)
            })?;
            println!("{deck}");
        }
        Command::Due { owner, deck, limit } => {
            let selector = DueCardSelector::new(store, config.queue.default_limit);
            let cards = selector.due_cards(&owner, deck.as_deref(), limit).await;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
        Command::Count { owner, deck } => {
            let selector = DueCardSelector::new(store, config.queue.default_limit);
            println!("{}", selector.due_count(&owner, deck.as_deref()).await);
        }
        Command::Review { card_id, rating } => {
            let service = ReviewService::new(store, config.build_scheduler()?);
            let (card, log) = service.submit_review(&card_id, rating).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "card": card, "reviewLog": log }))?
            );
        }
    }

    Ok(())
}
