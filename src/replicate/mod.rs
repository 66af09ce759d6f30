pub mod client;

use crate::{error::Result, models::FluxInput};
use async_trait::async_trait;

pub use client::ReplicateClient;

/// A hosted image model: runs a prediction and serves its outputs.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Runs one prediction to completion and returns its output URLs.
    async fn run(&self, input: &FluxInput) -> Result<Vec<String>>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}
