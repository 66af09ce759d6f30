pub mod memory;
pub mod supabase;
pub mod traits;

use crate::{config::Config, error::Result, StudioError};
use std::sync::Arc;

pub use memory::MemoryStorage;
pub use supabase::SupabaseStorage;
pub use traits::{ObjectStorage, RecordStore};

/// The configured object storage and record store, behind trait objects.
#[derive(Clone)]
pub struct StorageManager {
    objects: Arc<dyn ObjectStorage>,
    records: Arc<dyn RecordStore>,
}

impl StorageManager {
    pub async fn new(config: &Config) -> Result<Self> {
        if let Some(supabase) = config.supabase.as_ref().filter(|s| s.is_configured()) {
            let backend = Arc::new(SupabaseStorage::new(supabase)?);
            match backend.health_check().await {
                Ok(true) => log::info!("✅ Supabase reachable"),
                Ok(false) => log::warn!("⚠️  Supabase health check returned an error status"),
                Err(e) => log::warn!("⚠️  Supabase health check failed: {}", e),
            }
            return Ok(Self::from_backend(backend));
        }

        if config.use_memory_storage {
            log::warn!("⚠️  Using in-memory storage; uploads and records are lost on exit");
            return Ok(Self::from_backend(Arc::new(MemoryStorage::new())));
        }

        Err(StudioError::ConfigError(
            "No storage backend configured".into(),
        ))
    }

    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ObjectStorage + RecordStore + 'static,
    {
        Self {
            objects: backend.clone(),
            records: backend,
        }
    }

    pub fn objects(&self) -> Arc<dyn ObjectStorage> {
        self.objects.clone()
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        self.records.clone()
    }
}
