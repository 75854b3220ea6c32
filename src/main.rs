mod appointments;
mod auth;
mod config;
mod db;
mod error;
mod gateway;
mod middleware;
mod models;
mod notify;
mod reports;
mod routes;
mod session;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    gateway::ApiClient,
    models::AppState,
    notify::ToastHub,
    session::{MemorySessionStore, SessionStore},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

async fn session_store(cfg: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    match &cfg.database_url {
        Some(url) => {
            let store = db::PgSessionStore::new(db::connect_pg(url).await?);
            store.init_schema().await?;
            tracing::info!("sessions persisted in postgres");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("DATABASE_URL not set; sessions kept in memory");
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}

const SESSION_SWEEP_EVERY: Duration = Duration::from_secs(300);

/// Periodically evict expired sessions together with their toast queues.
fn spawn_session_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_SWEEP_EVERY);
        loop {
            tick.tick().await;
            if let Err(e) = session::sweep_expired(state.sessions.as_ref(), &state.toasts).await {
                tracing::warn!(error = %e, "session sweep failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let http = reqwest::Client::new();

    let state = AppState {
        sessions: session_store(&cfg).await?,
        toasts: Arc::new(ToastHub::new(cfg.toast_ttl)),
        backend: ApiClient::with_client(http.clone(), &cfg.backend_url),
        chatbot: ApiClient::with_client(http, &cfg.chatbot_url),
        session_ttl_hours: cfg.session_ttl_hours,
    };
    tracing::info!(
        backend = %state.backend.base_url(),
        chatbot = %state.chatbot.base_url(),
        "upstream services"
    );

    spawn_session_sweeper(state.clone());

    // The browser front-end is served from its own origin during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
