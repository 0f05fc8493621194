//! Exercise Engine · reference backend
//!
//! - Axum HTTP API for exercises, responses, chat turns, assets and text enhancement
//! - Optional OpenAI integration (via environment variables)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   OPENAI_API_KEY       : enables OpenAI integration if present
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL    : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL  : default "gpt-4o"
//!   EXERCISE_CONFIG_PATH : path to TOML config (prompts, authoring defaults, autosave)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, instrument};

use exercise_engine::routes::build_router;
use exercise_engine::state::AppState;
use exercise_engine::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (in-memory stores, OpenAI client, config).
  let state = Arc::new(AppState::new());

  // HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "exercise_engine", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "exercise_engine", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
