use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use queryflow::capability::chat::ChatInvoker;
use queryflow::capability::fixture::FixtureStore;
use queryflow::capability::store::SchemaCache;
use queryflow::capability::tools::StaticToolRegistry;
use queryflow::workflow::config::RunConfig;
use queryflow::workflow::engine::{Collaborators, Engine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a natural-language request against a store fixture
    Ask {
        /// The request to answer
        #[arg(short, long)]
        request: String,

        /// YAML fixture describing stores, schemas, and rows
        #[arg(short, long)]
        stores: PathBuf,

        /// Optional run configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// The model to use
        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Ask {
            request,
            stores,
            config,
            model,
        } => {
            let config = match config {
                Some(path) => RunConfig::from_yaml_file(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => RunConfig::default(),
            };

            let store = Arc::new(
                FixtureStore::from_file(&stores)
                    .map_err(|e| anyhow::anyhow!("loading store fixture: {e}"))?,
            );
            let invoker = ChatInvoker::new(model).map_err(|e| anyhow::anyhow!("{e}"))?;
            let schemas = Arc::new(SchemaCache::new(
                store.clone(),
                Duration::from_secs(config.schema_ttl_secs),
            ));

            let engine = Engine::new(
                Collaborators {
                    invoker: Arc::new(invoker),
                    executor: store,
                    schemas,
                    tools: Arc::new(StaticToolRegistry::new()),
                },
                config,
            );

            let cancel = CancellationToken::new();
            let output = engine.run(&request, &cancel).await?;

            println!("{}", output.final_response);
            if let Some(query) = &output.generated_query {
                println!("\nquery: {query}");
            }
            log::info!(
                "run {} finished after {} steps, {} attempts",
                output.run_id,
                output.trace.len(),
                output.attempt_count
            );
            for entry in &output.trace {
                log::debug!(
                    "  {} [{}ms] {}",
                    entry.step,
                    entry.duration_ms,
                    entry.outcome
                );
            }
        }
    }

    Ok(())
}
