use anyhow::Result;
use clap::Parser;
use social_data_agent::{open_store, AgentConfig, AgentError, Ingestor, LlmClient, QueryPipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "social-agent")]
#[command(about = "Ingest social media exports and answer questions about them in plain English")]
struct Args {
    /// Question to answer over the ingested data
    question: Option<String>,

    /// JSON export to ingest (overrides SOURCE_FILE)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Query the store as it is, without ingesting
    #[arg(long)]
    skip_ingest: bool,

    /// Empty both tables before ingesting
    #[arg(long, conflicts_with = "skip_ingest")]
    reset: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<AgentError>() {
                Some(agent_error) => eprintln!("{}: {}", agent_error.kind(), agent_error),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AgentConfig::from_env()?;
    let store = open_store(&config.store).await?;
    store.ensure_schema().await?;

    if !args.skip_ingest {
        if args.reset {
            info!("Resetting posts and comments");
            store.reset().await?;
        }
        let source = args.source.unwrap_or_else(|| config.source_file.clone());
        let summary = Ingestor::new(store.clone(), config.chunk_size).ingest_file(&source).await?;
        println!("=== Ingestion ===");
        println!("{}", summary);
    }

    let Some(question) = args.question else {
        return Ok(());
    };

    let model = Arc::new(LlmClient::new(&config.llm)?);
    let pipeline = QueryPipeline::from_config(&config, model, store);
    let answer = pipeline.answer(&question).await?;

    println!("\n=== Generated SQL ===");
    println!("{}", answer.sql);
    println!("\n=== Results ({} rows) ===", answer.result.row_count);
    println!("{}", answer.result.to_pretty_json()?);
    println!("\n=== Explanation ===");
    println!("{}", answer.explanation);

    Ok(())
}
