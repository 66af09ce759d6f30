use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{Result, StudioError},
    models::storage::{
        GeneratedImage, GeneratedImageInsert, InputImage, InputImageInsert, LoraDataset,
        LoraDatasetInsert, UploadResult,
    },
    storage::traits::{ObjectStorage, RecordStore},
};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Process-local storage backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    input_images: RwLock<Vec<InputImage>>,
    generated_images: RwLock<Vec<GeneratedImage>>,
    lora_datasets: RwLock<Vec<LoraDataset>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

// Newest first; rows created in the same instant keep reverse insertion order.
fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadResult> {
        let key = (bucket.to_string(), path.to_string());
        let mut objects = self.objects.write().await;
        if !upsert && objects.contains_key(&key) {
            return Err(StudioError::StorageError(format!(
                "The resource already exists: {}/{}",
                bucket, path
            )));
        }
        objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );

        Ok(UploadResult {
            bucket: bucket.to_string(),
            path: path.to_string(),
            public_url: self.public_url(bucket, path),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl RecordStore for MemoryStorage {
    async fn save_input_image(&self, record: InputImageInsert) -> Result<InputImage> {
        let row = InputImage {
            id: Uuid::new_v4().to_string(),
            url: record.url,
            filename: record.filename,
            prompt: record.prompt,
            created_at: Utc::now(),
        };
        self.input_images.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_input_images(&self) -> Result<Vec<InputImage>> {
        Ok(newest_first(&self.input_images.read().await, |r| r.created_at))
    }

    async fn save_generated_image(&self, record: GeneratedImageInsert) -> Result<GeneratedImage> {
        let row = GeneratedImage {
            id: Uuid::new_v4().to_string(),
            input_id: record.input_id,
            output_url: record.output_url,
            model_name: record.model_name,
            lora_used: record.lora_used,
            tags: record.tags,
            steps: record.steps,
            seed: record.seed,
            guidance_scale: record.guidance_scale,
            denoise_strength: record.denoise_strength,
            created_at: Utc::now(),
        };
        self.generated_images.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_generated_images(&self) -> Result<Vec<GeneratedImage>> {
        Ok(newest_first(&self.generated_images.read().await, |r| {
            r.created_at
        }))
    }

    async fn list_generated_images_by_input(
        &self,
        input_id: &str,
    ) -> Result<Vec<GeneratedImage>> {
        let rows = self.generated_images.read().await;
        let matching: Vec<GeneratedImage> = rows
            .iter()
            .filter(|r| r.input_id.as_deref() == Some(input_id))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |r| r.created_at))
    }

    async fn save_lora_dataset(&self, record: LoraDatasetInsert) -> Result<LoraDataset> {
        let row = LoraDataset {
            id: Uuid::new_v4().to_string(),
            name: record.name,
            description: record.description,
            dataset_url: record.dataset_url,
            image_count: record.image_count,
            created_at: Utc::now(),
        };
        self.lora_datasets.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_lora_datasets(&self) -> Result<Vec<LoraDataset>> {
        Ok(newest_first(&self.lora_datasets.read().await, |r| r.created_at))
    }

    async fn delete_lora_dataset(&self, id: &str) -> Result<bool> {
        let mut rows = self.lora_datasets.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_respects_upsert() {
        let storage = MemoryStorage::new();
        let first = storage
            .upload("bucket1", "generated/a.webp", vec![1, 2], "image/webp", false)
            .await
            .unwrap();
        assert_eq!(first.public_url, "memory://bucket1/generated/a.webp");

        let dup = storage
            .upload("bucket1", "generated/a.webp", vec![3], "image/webp", false)
            .await;
        assert!(matches!(dup, Err(StudioError::StorageError(_))));

        storage
            .upload("bucket1", "generated/a.webp", vec![3], "image/webp", true)
            .await
            .unwrap();
        let stored = storage.object("bucket1", "generated/a.webp").await.unwrap();
        assert_eq!(stored.bytes, vec![3]);
        assert_eq!(stored.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let storage = MemoryStorage::new();
        for name in ["one", "two", "three"] {
            storage
                .save_input_image(InputImageInsert {
                    url: format!("https://x/{}.png", name),
                    filename: None,
                    prompt: Some(name.to_string()),
                })
                .await
                .unwrap();
        }
        let prompts: Vec<String> = storage
            .list_input_images()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.prompt)
            .collect();
        assert_eq!(prompts, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_generated_by_input() {
        let storage = MemoryStorage::new();
        let input = storage
            .save_input_image(InputImageInsert {
                url: "https://x/in.png".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        storage
            .save_generated_image(GeneratedImageInsert {
                input_id: Some(input.id.clone()),
                output_url: Some("https://x/out.webp".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        storage
            .save_generated_image(GeneratedImageInsert::default())
            .await
            .unwrap();

        assert_eq!(storage.list_generated_images().await.unwrap().len(), 2);
        let linked = storage.list_generated_images_by_input(&input.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].output_url.as_deref(), Some("https://x/out.webp"));
    }

    #[tokio::test]
    async fn test_delete_lora_dataset() {
        let storage = MemoryStorage::new();
        let ds = storage
            .save_lora_dataset(LoraDatasetInsert {
                name: Some("portraits".into()),
                image_count: Some(12),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(storage.delete_lora_dataset(&ds.id).await.unwrap());
        assert!(!storage.delete_lora_dataset(&ds.id).await.unwrap());
        assert!(storage.list_lora_datasets().await.unwrap().is_empty());
    }
}
