pub mod common;
pub mod generation;
pub mod image;
pub mod storage;

pub use common::*;
pub use generation::*;
pub use image::*;
pub use storage::*;
