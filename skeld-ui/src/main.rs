//! Skeld UI server: runs an experiment with a human seat and serves the
//! pending human requests over HTTP.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use skeld::bridge::HumanBridge;
use skeld::io::config::load_config;
use skeld::io::event_log::{EventSink, JsonlSink};
use skeld::orchestrator::Orchestrator;
use skeld::setup::{GameFactory, decision_endpoint};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::state::{AppState, drive};

#[derive(Parser)]
#[command(name = "skeld-ui")]
#[command(about = "Play a human seat in skeld games through a web API")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Experiment config file
    #[arg(short, long, default_value = "skeld.toml")]
    config: PathBuf,

    /// Directory containing UI static files
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skeld_ui=info".parse()?)
                .add_directive("skeld=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let cfg = load_config(&args.config)?;
    match cfg.agents.human_seat {
        Some(seat) => info!(seat, "human seat configured"),
        None => warn!("no human seat configured; games run unattended"),
    }

    let bridge = HumanBridge::new();
    let sink: Arc<dyn EventSink> = Arc::new(JsonlSink::create(Path::new(&cfg.run.log_dir))?);
    let factory = GameFactory::new(&cfg, decision_endpoint(&cfg)?, Some(bridge.clone()))?;
    let mut pool = Orchestrator::new(cfg.run.concurrency, sink);
    for game_id in 0..cfg.run.games {
        let setup = factory
            .build(game_id)
            .with_context(|| format!("set up game {game_id}"))?;
        pool.spawn(setup);
    }
    info!(
        games = cfg.run.games,
        seed = factory.base_seed(),
        log_dir = %cfg.run.log_dir,
        "starting games"
    );

    let state = AppState::new(bridge, pool.cancel_handles());
    sse::start_bridge_forwarder(state.clone());
    tokio::spawn(drive(pool, state.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    if let Some(ui_dir) = args.ui_dir {
        if ui_dir.exists() {
            info!(ui_dir = %ui_dir.display(), "serving static UI files");
            app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
        } else {
            info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
        }
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
