//! HTTP server for the screening match engine (REST + WebSocket notifications).
//!
//! Env: `PORT`, `STATE_FILE`, `API_KEYS`, `DISABLE_AUTH`, plus the engine settings read by
//! `EngineConfig::from_env`.

use screening_match_engine::api::{self, AppState};
use screening_match_engine::audit::StdoutAuditSink;
use screening_match_engine::persistence::FilePersistence;
use screening_match_engine::{AuthConfig, Engine, EngineConfig};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();
    let config = EngineConfig::from_env();
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let persistence = std::env::var("STATE_FILE").ok().map(FilePersistence::new);
    let engine = match &persistence {
        Some(p) => match p.load()? {
            Some(state) => {
                log::info!("state restored path={}", p.path().display());
                Engine::from_snapshot(config, state.engine)
            }
            None => Engine::new(config),
        },
        None => Engine::new(config),
    };

    let state = AppState::new(engine, Arc::new(StdoutAuditSink), persistence);
    let app = api::create_router_with(state, AuthConfig::from_env());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
