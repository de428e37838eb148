use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use listing_aggregator::{
    parse_list, sources, Aggregator, AnnouncementExtractor, ArtifactStore, FetchConfig, LlmConfig,
    OpenAiCompatibleAdapter, Orchestrator, RunConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "listing-aggregator")]
#[command(about = "Crawl exchange listing/delisting announcements and build summary tables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args)]
struct Overrides {
    /// Directory holding artifacts and CSV output
    #[arg(long, global = true)]
    output_root: Option<PathBuf>,

    /// Trailing freshness window in days
    #[arg(long, global = true)]
    freshness_days: Option<i64>,

    /// Maximum announcements handled per exchange
    #[arg(long, global = true)]
    max_items: Option<usize>,

    /// Comma-separated exchanges to crawl (e.g. "binance,okx")
    #[arg(long, global = true)]
    exchanges: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every enabled exchange and store new artifacts
    Crawl,
    /// Build announcements CSVs from stored artifacts
    Aggregate,
    /// Crawl, then aggregate
    Run,
}

impl Overrides {
    fn apply(self, mut config: RunConfig) -> anyhow::Result<RunConfig> {
        if let Some(root) = self.output_root {
            config.output_root = root;
        }
        if let Some(days) = self.freshness_days {
            config.freshness_days = days;
        }
        if let Some(max) = self.max_items {
            config.max_items_per_exchange = Some(max);
        }
        if let Some(list) = self.exchanges {
            config.exchanges = parse_list(&list);
        }
        config.validate()?;
        Ok(config)
    }
}

fn build_extractor(config: &RunConfig) -> anyhow::Result<AnnouncementExtractor> {
    let extractor = match LlmConfig::from_env() {
        Some(llm_config) => {
            let adapter = OpenAiCompatibleAdapter::new(&llm_config).context("Failed to build LLM client")?;
            info!("Using model {} at {}", llm_config.model, llm_config.base_url);
            AnnouncementExtractor::new(Arc::new(adapter))
                .with_generation(llm_config.temperature, llm_config.max_tokens)
        }
        None => {
            warn!("No LLM API key configured; extraction will use keyword rules only");
            AnnouncementExtractor::heuristic_only()
        }
    };
    Ok(extractor
        .with_max_prompt_chars(config.max_prompt_chars)
        .with_timeout(config.extraction_timeout()))
}

async fn crawl(config: &RunConfig, store: &ArtifactStore) -> anyhow::Result<()> {
    let adapters = sources::build_all(&config.exchanges, &FetchConfig::default())
        .context("Failed to build site adapters")?;
    let extractor = Arc::new(build_extractor(config)?);
    let orchestrator = Orchestrator::new(adapters, extractor, store.clone(), config.clone());

    let report = orchestrator.run().await;
    for outcome in &report.outcomes {
        match &outcome.adapter_error {
            Some(e) => error!("{}: failed: {}", outcome.exchange, e),
            None => info!(
                "{}: {} listed, {} new ({} placeholders), {} failed",
                outcome.exchange,
                outcome.listed,
                outcome.new_artifacts(),
                outcome.placeholders,
                outcome.failed_targets.len()
            ),
        }
    }
    Ok(())
}

async fn aggregate(config: &RunConfig, store: &ArtifactStore) -> anyhow::Result<()> {
    let aggregator = Aggregator::new(config);
    let tables = aggregator
        .run(store, &config.output_root, Utc::now())
        .await
        .context("Failed to aggregate artifacts")?;
    info!(
        "Aggregated {} rows for run date {}",
        tables.long_form.len(),
        tables.run_date
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,listing_aggregator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli
        .overrides
        .apply(RunConfig::from_env().context("Invalid configuration in environment")?)?;
    let store = ArtifactStore::new(config.artifacts_dir());
    info!("Output root: {}", config.output_root.display());

    match cli.command {
        Commands::Crawl => crawl(&config, &store).await?,
        Commands::Aggregate => aggregate(&config, &store).await?,
        Commands::Run => {
            crawl(&config, &store).await?;
            aggregate(&config, &store).await?;
        }
    }

    info!("Listing aggregator finished");
    Ok(())
}
