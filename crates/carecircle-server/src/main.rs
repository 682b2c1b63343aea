//! CareCircle API server.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod agent;
mod config;
mod http;
mod state;

use agent::CommandExecutor;
use carecircle_engine::EngineConfig;
use config::Config;
use state::AppState;

/// CareCircle server - care request intake and task coordination
#[derive(Parser)]
#[command(name = "carecircle-server")]
#[command(about = "HTTP API for the CareCircle planning pipeline", long_about = None)]
struct Cli {
    /// HTTP bind address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Agent command invoked once per pipeline stage
    #[arg(short, long, default_value = "carecircle-agent")]
    agent: String,

    /// Skip the optional plan optimization stage
    #[arg(long)]
    no_optimization: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config {
        bind_addr: cli.bind,
        agent_command: cli.agent,
        run_optimization: !cli.no_optimization,
    };

    let addr: SocketAddr = config.bind_addr.parse()?;

    let executor = Arc::new(CommandExecutor::new(&config.agent_command));
    let engine_config = EngineConfig {
        run_optimization: config.run_optimization,
        ..EngineConfig::default()
    };
    let state = AppState::new(executor, engine_config);

    let router = http::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(
        addr = %addr,
        agent = %config.agent_command,
        optimization = config.run_optimization,
        "Starting CareCircle server"
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
