use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use todochat_db::Database;
use todochat_gateway::Registry;

use crate::cache::DetailCache;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub registry: Registry,
    pub cache: DetailCache,
    /// Fixed latency added to every uncached todo detail lookup.
    pub detail_delay: Duration,
}

impl AppStateInner {
    pub fn new(db: Database, registry: Registry, cache: DetailCache, detail_delay: Duration) -> AppState {
        Arc::new(Self {
            db,
            registry,
            cache,
            detail_delay,
        })
    }
}

/// Run a blocking DB closure off the async runtime.
pub async fn with_db<F, T, E>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(Into::into)
}
