pub mod canvas;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod replicate;
pub mod storage;
pub mod studio;

#[cfg(feature = "server")]
pub mod server;

pub use canvas::{Framebuffer, MaskSurface, PointerEvent, Tool};
pub use config::{BackendConfig, Config, ReplicateConfig, SupabaseConfig};
pub use error::{Result, StudioError};
pub use replicate::{ImageProvider, ReplicateClient};
pub use storage::{MemoryStorage, ObjectStorage, RecordStore, StorageManager, SupabaseStorage};
pub use studio::{
    BackendClient, EditorSession, GenerationBackend, GenerationService, SessionEvent,
    StudioContext,
};
