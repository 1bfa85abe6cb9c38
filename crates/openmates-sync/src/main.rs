use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use openmates_core::config::OpenMatesConfig;
use openmates_core::types::now_millis;
use openmates_hotcache::HotCache;
use openmates_keyvault::{InProcessKeyVault, KeyVault};
use openmates_metadatastore::MetadataStore;
use openmates_offline::OfflineReplayer;
use openmates_reminders::ReminderEngine;
use openmates_users::UserResolver;
use openmates_version::VersionEngine;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{info, warn};

mod app;
mod connections;
mod http;
mod ws;

use connections::ConnectionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openmates_sync=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > OPENMATES_CONFIG env > ./openmates.toml
    let config_path = std::env::var("OPENMATES_CONFIG").ok();
    let config = OpenMatesConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        OpenMatesConfig::default()
    });

    if let Some(parent) = Path::new(&config.metadatastore.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&config.metadatastore.path)?;
    openmates_metadatastore::db::init_db(&conn)?;
    let store = Arc::new(MetadataStore::new(conn));

    std::fs::create_dir_all(&config.hotcache.spill_dir)?;
    let cache = Arc::new(HotCache::new(&config.hotcache));
    cache.restore_from_spill(now_millis())?;

    let vault = InProcessKeyVault::new(Duration::from_secs(config.keyvault.dek_cache_ttl_secs));
    vault.ensure_hmac_key(&config.keyvault.email_hmac_key_id).await;
    let vault: Arc<dyn KeyVault> = Arc::new(vault);

    let users = UserResolver::new(store.clone(), vault.clone(), config.keyvault.email_hmac_key_id.clone());
    let version_engine = Arc::new(VersionEngine::new(cache.clone()));
    let connections = Arc::new(ConnectionRegistry::new());

    let (persistence, persistence_worker) = openmates_persistence::channel(store.clone(), &config.persistence);
    let offline = OfflineReplayer::new(
        version_engine.clone(),
        cache.clone(),
        connections.clone(),
        Arc::new(persistence.clone()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let persistence_task = tokio::spawn(persistence_worker.run(shutdown_rx.clone()));

    let reminder_engine = ReminderEngine::new(cache.clone(), connections.clone(), config.reminders.tick_interval_ms);
    let reminder_task = tokio::spawn(reminder_engine.run(shutdown_rx));

    let state = Arc::new(app::AppState::new(
        config.clone(),
        cache.clone(),
        store,
        vault,
        users,
        version_engine,
        offline,
        persistence,
        connections,
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("openmates-sync listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain sequence : stop accepting new actions (the listener is
    // already down by the time `with_graceful_shutdown` returns), flush the
    // persistence queue, then spill HotCache state for the next restart.
    info!("shutting down: flushing persistence queue and spilling HotCache");
    let _ = shutdown_tx.send(true);
    let _ = persistence_task.await;
    let _ = reminder_task.await;
    cache.spill(now_millis())?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
