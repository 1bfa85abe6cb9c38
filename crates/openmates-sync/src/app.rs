use std::sync::Arc;

use axum::{routing::get, Router};
use openmates_core::config::OpenMatesConfig;
use openmates_core::error::Result;
use openmates_hotcache::HotCache;
use openmates_keyvault::KeyVault;
use openmates_metadatastore::MetadataStore;
use openmates_offline::OfflineReplayer;
use openmates_pendingdelivery::PendingDeliveryReplayer;
use openmates_persistence::PersistenceHandle;
use openmates_users::UserResolver;
use openmates_version::VersionEngine;

use crate::connections::ConnectionRegistry;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler
/// and WS connection task.
pub struct AppState {
    pub config: OpenMatesConfig,
    pub cache: Arc<HotCache>,
    pub store: Arc<MetadataStore>,
    pub vault: Arc<dyn KeyVault>,
    pub users: UserResolver,
    pub version_engine: Arc<VersionEngine>,
    pub offline: OfflineReplayer,
    pub persistence: PersistenceHandle,
    pub pending_delivery: PendingDeliveryReplayer,
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OpenMatesConfig,
        cache: Arc<HotCache>,
        store: Arc<MetadataStore>,
        vault: Arc<dyn KeyVault>,
        users: UserResolver,
        version_engine: Arc<VersionEngine>,
        offline: OfflineReplayer,
        persistence: PersistenceHandle,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        let pending_delivery = PendingDeliveryReplayer::new(cache.clone());
        Self {
            config,
            cache,
            store,
            vault,
            users,
            version_engine,
            offline,
            persistence,
            pending_delivery,
            connections,
        }
    }

    /// Version accept/reject, title/draft size checks, and persistence
    /// backpressure all enforce the same bounds regardless of which action
    /// triggered them; `require_not_overloaded` is the one check every
    /// mutating handler runs first (backpressure).
    pub fn require_not_overloaded(&self) -> Result<()> {
        if self.persistence.is_overloaded() {
            return Err(openmates_core::error::OpenMatesError::Overloaded);
        }
        Ok(())
    }
}

/// Assemble the full Axum router: a WS upgrade endpoint and a health probe.
/// No HTTP/REST façade beyond that.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
