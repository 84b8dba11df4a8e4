use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatrag_knowledge::{BotScope, SourceMeta};
use chatrag_pipeline::{RagConfig, RagService};
use chatrag_retrieval::RetrieveOptions;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chatrag", about = "Knowledge retrieval and customer memory for chat bots")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true, value_name = "PATH", env = "CHATRAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the fragment drafts of a text file as JSON.
    Chunk {
        file: PathBuf,
        /// Source name recorded on each draft. Defaults to the file name.
        #[arg(long)]
        source: Option<String>,
    },

    /// Print the embedding of a text and the mode that produced it.
    Embed { text: String },

    /// Ingest a file for a bot and print the merged retrieval results.
    Ask {
        #[arg(long)]
        bot: String,
        #[arg(long, value_name = "FILE")]
        knowledge: Vec<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
        query: String,
    },

    /// Send one chat message to a configured bot.
    Chat {
        #[arg(long)]
        bot: String,
        #[arg(long, default_value = "cli")]
        customer: String,
        #[arg(long, value_name = "FILE")]
        knowledge: Vec<PathBuf>,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RagConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => RagConfig::default(),
    };

    match cli.command {
        Command::Chunk { file, source } => {
            let service = RagService::builder(config).offline().build().await?;
            let text = read(&file).await?;
            let source = SourceMeta::from_filename(source.unwrap_or_else(|| file_name(&file)));
            let drafts = service.chunk_document(&text, &source);
            println!("{}", serde_json::to_string_pretty(&drafts)?);
        }
        Command::Embed { text } => {
            let service = RagService::builder(config).build().await?;
            let vector = service.embed(&text).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "mode": service.embedding_mode(),
                    "dimension": vector.len(),
                    "embedding": vector,
                }))?
            );
        }
        Command::Ask {
            bot,
            knowledge,
            limit,
            threshold,
            query,
        } => {
            let service = RagService::builder(config).build().await?;
            let bot = BotScope::new(bot);
            ingest_all(&service, &bot, &knowledge).await?;

            let options = RetrieveOptions {
                limit,
                similarity_threshold: threshold,
            };
            let items = service.retrieve_context(&bot, &query, options).await;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Chat {
            bot,
            customer,
            knowledge,
            message,
        } => {
            let service = RagService::builder(config).build().await?;
            ingest_all(&service, &BotScope::new(bot.as_str()), &knowledge).await?;

            let turn = service.handle_turn(&bot, &customer, &message).await?;
            println!("{}", turn.reply);
            // Let the turn be recorded before the runtime shuts down.
            turn.persistence.await?;
        }
    }

    Ok(())
}

async fn ingest_all(service: &RagService, bot: &BotScope, files: &[PathBuf]) -> Result<()> {
    for file in files {
        let text = read(file).await?;
        let report = service
            .ingest(bot, &text, &SourceMeta::from_filename(file_name(file)))
            .await
            .with_context(|| format!("ingesting {}", file.display()))?;
        tracing::info!(
            "Ingested {}: {} drafts, {} fragments",
            file.display(),
            report.drafts,
            report.fragments
        );
    }
    Ok(())
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
