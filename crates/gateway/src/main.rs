use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gateway::config::{Config, DEFAULT_CONFIG_FILE};
use gateway::{Error, Result, router};
use mcp::SseConnector;
use runtime::{EnvClientFactory, Orchestrator, ProcessEnv};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "club-gateway")]
#[command(about = "AI gateway for the Club AI Hub", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the gateway config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Listen address, overriding server.bind
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Resolve the provider and reach the tool host, then exit
    Check,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?.apply_env(&ProcessEnv);

    match cli.command {
        Some(Commands::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
        Some(Commands::Check) => cmd_check(config).await,
    }
}

fn build_orchestrator(config: &Config) -> Orchestrator<EnvClientFactory, SseConnector> {
    let factory = EnvClientFactory::from_process_env().with_timeout(config.llm_timeout());
    let connector =
        SseConnector::new(config.tool_host.url.clone()).with_request_timeout(config.request_timeout());
    Orchestrator::with_settings(factory, connector, config.orchestrator_settings())
}

async fn cmd_serve(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let bind = bind.unwrap_or(config.server.bind);
    let orchestrator = Arc::new(build_orchestrator(&config));

    match orchestrator.active_model() {
        Ok((provider, model)) => info!(%provider, %model, "llm provider resolved"),
        Err(e) => tracing::warn!(error = %e, "llm provider not configured; chat requests will fail"),
    }

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(
        %bind,
        tool_host = %config.tool_host.url,
        max_tool_rounds = config.chat.max_tool_rounds,
        "club-gateway listening"
    );

    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("club-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn cmd_check(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config);
    let mut problems = Vec::new();

    match orchestrator.active_model() {
        Ok((provider, model)) => {
            println!("provider:  {provider}");
            println!("model:     {model}");
        }
        Err(e) => {
            println!("provider:  not configured ({e})");
            problems.push("llm provider");
        }
    }

    match orchestrator.catalog().await {
        Ok(tools) => println!("tool host: {} ({} tools)", orchestrator.tool_host(), tools.len()),
        Err(e) => {
            println!("tool host: {} unreachable ({e})", orchestrator.tool_host());
            problems.push("tool host");
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::CheckFailed(problems.join(", ")))
    }
}
