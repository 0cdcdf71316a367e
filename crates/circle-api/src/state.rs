use std::sync::Arc;

use tracing::error;

use circle_db::Database;
use circle_gateway::{Dispatcher, PresenceTracker};

use crate::error::{ApiError, ApiResult};
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub presence: PresenceTracker,
    pub storage: Storage,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// Run a store call off the async runtime.
    pub async fn db_call<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> circle_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        blocking(move || f(&db)).await
    }
}

/// Run blocking work that touches the store on the blocking pool.
pub async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> circle_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("background task failed")
        })?
        .map_err(ApiError::from)
}
