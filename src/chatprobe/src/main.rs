//! chatprobe: drives simulated customers against a support agent and
//! reports how the agent holds up.
//!
//! `serve` exposes the suite control API; `run` executes one suite from a
//! JSON file and prints the report.

use chatprobe_api::rest::StartTestRequest;
use chatprobe_api::ApiServer;
use chatprobe_core::config::AppConfig;
use chatprobe_orchestrator::reporter::render_text;
use chatprobe_orchestrator::{
    Collaborators, HttpTargetAdapter, InMemoryTestRegistry, JsonFileReportStore,
    ScriptedPersonaGenerator, SuiteOrchestrator, SuiteService,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "chatprobe")]
#[command(about = "Autonomous conversation testing for customer-support agents")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "CHATPROBE_CONFIG")]
    config: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CHATPROBE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Base URL of the agent under test (overrides config)
    #[arg(long, env = "CHATPROBE__TARGET__BASE_URL")]
    target_url: Option<String>,

    /// Directory for persisted reports (overrides config)
    #[arg(long, env = "CHATPROBE__REPORTS__DIR")]
    reports_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the suite control API (default)
    Serve,
    /// Run a single suite and print its report
    Run {
        /// Suite definition as JSON
        #[arg(long)]
        suite: PathBuf,

        /// Print the full report as JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "chatprobe=info,chatprobe_orchestrator=info,chatprobe_api=info,tower_http=info"
                        .into()
                }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("chatprobe starting up");

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(url) = cli.target_url {
        config.target.base_url = url;
    }
    if let Some(dir) = cli.reports_dir {
        config.reports.dir = dir;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        target = %config.target.base_url,
        reports_dir = %config.reports.dir,
        "Configuration loaded"
    );

    let adapter = Arc::new(HttpTargetAdapter::new(&config.target)?);
    let generator = Arc::new(ScriptedPersonaGenerator::new(
        config.suite.scripted_follow_ups as usize,
    ));
    let store = Arc::new(JsonFileReportStore::new(&config.reports.dir));
    let collaborators = Collaborators::new(adapter, generator, store);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, collaborators).await,
        Command::Run { suite, json } => run_once(&config, collaborators, suite, json).await,
    }
}

async fn serve(config: AppConfig, collaborators: Collaborators) -> anyhow::Result<()> {
    let service = Arc::new(
        SuiteService::new(collaborators, Arc::new(InMemoryTestRegistry::new())).with_retention(
            Duration::from_secs(config.suite.finished_retention_secs),
        ),
    );
    let api_server = ApiServer::new(config.clone(), service);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics().await {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("chatprobe is ready to accept suites");

    api_server.start_http().await?;

    Ok(())
}

async fn run_once(
    config: &AppConfig,
    collaborators: Collaborators,
    suite: PathBuf,
    json: bool,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&suite).await?;
    let request: StartTestRequest = serde_json::from_str(&raw)?;
    let suite_config = request.into_config(&config.suite);

    let report = SuiteOrchestrator::new(collaborators)
        .run_suite(Uuid::new_v4(), suite_config)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_text(&report));
    }

    Ok(())
}
