//! Fixbot Daemon - maintenance-ticket chat wizard
//!
//! Receives bot webhook events, drives the per-conversation wizard and
//! files completed tickets.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use fixbotd::config::FixbotConfig;
use fixbotd::masters::{SqliteMasters, SqliteTicketSink};
use fixbotd::orchestrator::Orchestrator;
use fixbotd::server::{self, AppState};
use fixbotd::store::SessionStore;
use fixbotd::transport::HttpBotTransport;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Fixbot Daemon v{} starting", fixbot_shared::VERSION);

    let config = FixbotConfig::load();

    let store = Arc::new(SessionStore::open(
        &config.db_path,
        config.session_ttl_minutes,
    )?);
    let reaped = store.purge_expired()?;
    if reaped > 0 {
        info!("Reaped {} stale session(s) on startup", reaped);
    }

    let masters = Arc::new(SqliteMasters::open(&config.db_path)?);
    let tickets = Arc::new(SqliteTicketSink::open(&config.db_path)?);
    let transport = Arc::new(HttpBotTransport::new(&config.bot)?);

    let orchestrator = Orchestrator::new(
        store,
        masters.clone(),
        masters,
        tickets,
        transport,
    );

    server::run(AppState::new(orchestrator), &config.bind_addr).await
}
