use std::sync::Arc;

use theday_core::Storage;
use tokio::sync::OnceCell;

use crate::config::ServerConfig;

/// Application state shared across all requests
///
/// The store is opened on first use and shared by every later request.
/// Concurrent first requests race on the cell, not on the database: only
/// one of them connects.
#[derive(Clone)]
pub struct AppState {
    storage: Arc<OnceCell<Storage>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            storage: Arc::new(OnceCell::new()),
            config: Arc::new(config),
        }
    }

    /// State around an already opened store
    pub fn with_storage(config: ServerConfig, storage: Storage) -> Self {
        Self {
            storage: Arc::new(OnceCell::new_with(Some(storage))),
            config: Arc::new(config),
        }
    }

    pub async fn storage(&self) -> theday_core::Result<&Storage> {
        self.storage
            .get_or_try_init(|| async {
                tracing::info!("Connecting to tree store");
                let storage = Storage::connect(&self.config.database_url).await?;
                if let Some(root) = &self.config.root_folder_id {
                    if storage.ensure_folder(root, "Root").await? {
                        tracing::info!(root = %root, "Created root folder");
                    }
                }
                Ok(storage)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_connects_once_and_creates_root() {
        let state = AppState::new(ServerConfig {
            database_url: "sqlite::memory:".to_string(),
            root_folder_id: Some("root".to_string()),
            ..ServerConfig::default()
        });

        let (first, second) = tokio::join!(state.storage(), state.storage());
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.get_item("root").await.unwrap().name, "Root");

        second.ensure_folder("week1", "Week 1").await.unwrap();
        let cloned = state.clone();
        assert!(cloned.storage().await.unwrap().find_item("week1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn storage_without_root_folder() {
        let state = AppState::new(ServerConfig {
            database_url: "sqlite::memory:".to_string(),
            ..ServerConfig::default()
        });

        let storage = state.storage().await.unwrap();
        assert!(storage.find_item("root").await.unwrap().is_none());
    }
}
