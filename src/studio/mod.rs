//! Generation: the backend pipeline and the editor session that drives it.

pub mod backend;
pub mod service;
pub mod session;

pub use backend::{BackendClient, GenerationBackend};
pub use service::GenerationService;
pub use session::{EditorSession, SessionEvent, StudioContext};
