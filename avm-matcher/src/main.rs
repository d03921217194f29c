//! avm-matcher - Avatar match tournament
//!
//! `match` runs one tournament for a probe image and prints the result JSON.
//! `serve` exposes the same engine over HTTP.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use avm_common::config::{self, TomlConfig};
use avm_common::events::EventBus;
use avm_matcher::models::ProbeAsset;
use avm_matcher::services::{
    CandidateRepository, GeminiClient, GeminiClientConfig, HttpAssetFetcher, JsonlCandidateRepository,
    StripAnnotator,
};
use avm_matcher::tournament::{RandomShuffler, TournamentController, TournamentSettings};
use avm_matcher::{AppState, MatchError};

#[derive(Debug, Parser)]
#[command(name = "avm-matcher", version, about = "Tournament-elimination avatar matcher")]
struct Cli {
    /// TOML config file (default: ~/.config/avm/avm-matcher.toml)
    #[arg(long, global = true, env = "AVM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one tournament and print the result
    Match(MatchArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct MatchArgs {
    /// Probe image
    #[arg(long)]
    probe: PathBuf,

    /// Candidate metadata JSONL file
    #[arg(long, env = "AVM_METADATA")]
    metadata: Option<PathBuf>,

    /// Candidates per oracle comparison
    #[arg(long)]
    batch_size: Option<usize>,

    /// Write the result here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Listen address
    #[arg(long, env = "AVM_BIND")]
    bind: Option<String>,

    /// Candidate metadata JSONL file
    #[arg(long, env = "AVM_METADATA")]
    metadata: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match cli.config.clone().or_else(config::default_config_path) {
        Some(path) => config::load_toml_config(&path)?,
        None => TomlConfig::default(),
    };
    avm_common::logging::init_tracing(&config.logging)?;

    info!("Starting avm-matcher v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Match(args) => match run_match(config, args).await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(e) => {
                println!("{}", e.to_json());
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Serve(args) => {
            serve(config, args).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_match(mut config: TomlConfig, args: MatchArgs) -> Result<(), MatchError> {
    if let Some(batch_size) = args.batch_size {
        config.tournament.batch_size = batch_size;
    }
    if args.metadata.is_some() {
        config.metadata_path = args.metadata;
    }

    let probe = ProbeAsset::load(&args.probe)?;
    let (controller, _repository) = build_controller(&config)?;
    let result = controller.run(&probe).await?;

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| avm_common::Error::Internal(format!("Serialize result failed: {}", e)))?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json).map_err(avm_common::Error::from)?;
            info!(path = %path.display(), "Result written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn serve(mut config: TomlConfig, args: ServeArgs) -> Result<()> {
    if args.metadata.is_some() {
        config.metadata_path = args.metadata;
    }
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let (controller, repository) = build_controller(&config)?;
    let state = AppState::new(controller, repository);
    let app = avm_matcher::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Wire the production collaborators into a controller
fn build_controller(
    config: &TomlConfig,
) -> Result<(Arc<TournamentController>, Arc<dyn CandidateRepository>), MatchError> {
    let metadata_path = config.metadata_path.as_ref().ok_or_else(|| {
        MatchError::Config("no candidate metadata file (use --metadata or metadata_path)".to_string())
    })?;
    let repository: Arc<dyn CandidateRepository> =
        Arc::new(JsonlCandidateRepository::load(metadata_path)?);

    let fetcher = HttpAssetFetcher::new().map_err(|e| MatchError::Config(e.to_string()))?;

    let api_key = config::resolve_oracle_api_key(config)?;
    let oracle = GeminiClient::new(GeminiClientConfig::from_oracle_config(&config.oracle, api_key))
        .map_err(|e| MatchError::Config(e.to_string()))?;

    let settings = TournamentSettings::from_config(&config.tournament, &config.oracle)?;

    let controller = TournamentController::new(
        Arc::clone(&repository),
        Arc::new(fetcher),
        Arc::new(oracle),
        Arc::new(StripAnnotator::default()),
        Arc::new(RandomShuffler),
        settings,
        EventBus::default(),
    );
    Ok((Arc::new(controller), repository))
}
