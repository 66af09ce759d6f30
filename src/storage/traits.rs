use crate::{
    error::Result,
    models::storage::{
        GeneratedImage, GeneratedImageInsert, InputImage, InputImageInsert, LoraDataset,
        LoraDatasetInsert, UploadResult,
    },
};
use async_trait::async_trait;

/// Bucketed object storage with public URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadResult>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn health_check(&self) -> Result<bool>;
}

/// Row storage for the studio's three record kinds. Every `list_*` returns
/// newest first.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save_input_image(&self, record: InputImageInsert) -> Result<InputImage>;
    async fn list_input_images(&self) -> Result<Vec<InputImage>>;

    async fn save_generated_image(&self, record: GeneratedImageInsert) -> Result<GeneratedImage>;
    async fn list_generated_images(&self) -> Result<Vec<GeneratedImage>>;
    async fn list_generated_images_by_input(&self, input_id: &str)
        -> Result<Vec<GeneratedImage>>;

    async fn save_lora_dataset(&self, record: LoraDatasetInsert) -> Result<LoraDataset>;
    async fn list_lora_datasets(&self) -> Result<Vec<LoraDataset>>;
    async fn delete_lora_dataset(&self, id: &str) -> Result<bool>;
}
