use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rb_core::{Error, Result, SessionStore};

pub mod backends;
pub mod bookmarks;
pub mod local;

pub use backends::*;
pub use bookmarks::BookmarkStore;
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore};

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `memory` or, with the `sqlite` feature, `sqlite`
    pub backend: String,
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            database_path: PathBuf::from("research_buddy.db"),
        }
    }
}

#[async_trait]
pub trait StorageBackend: SessionStore + Sized {
    async fn open(config: &StorageConfig) -> Result<Self>;
}

pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn SessionStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStorage::open(config).await?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SQLiteStorage::open(config).await?)),
        other => Err(Error::Storage(format!("Unsupported storage backend: {}", other))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend, StorageConfig};
}
