use crate::{
    config::SupabaseConfig,
    error::{Result, StudioError},
    models::storage::{
        GeneratedImage, GeneratedImageInsert, InputImage, InputImageInsert, LoraDataset,
        LoraDatasetInsert, UploadResult,
    },
    storage::traits::{ObjectStorage, RecordStore},
};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Response,
};
use serde::{de::DeserializeOwned, Serialize};

const INPUT_IMAGES: &str = "input_images";
const GENERATED_IMAGES: &str = "generated_images";
const LORA_DATASETS: &str = "lora_datasets";

/// Supabase backend: PostgREST for rows, the Storage API for objects.
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl SupabaseStorage {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| StudioError::ConfigError("SUPABASE_URL is not configured".into()))?;
        let key = config.service_key.as_deref().ok_or_else(|| {
            StudioError::ConfigError("SUPABASE_SERVICE_ROLE_KEY is not configured".into())
        })?;

        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: Self::build_headers(key)?,
        })
    }

    fn build_headers(key: &str) -> Result<HeaderMap> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            StudioError::ConfigError(format!("invalid Supabase key: {}", e))
        };
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
        );
        Ok(headers)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }

    async fn error_text(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("HTTP {}: {}", status, body)
    }

    async fn insert<I, R>(&self, table: &str, record: &I) -> Result<R>
    where
        I: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.headers.clone())
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await
            .map_err(|e| StudioError::StorageError(format!("Supabase insert failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StudioError::StorageError(format!(
                "Error saving to {}: {}",
                table,
                Self::error_text(response).await
            )));
        }

        let mut rows: Vec<R> = response
            .json()
            .await
            .map_err(|e| StudioError::ResponseError(e.to_string()))?;
        if rows.is_empty() {
            return Err(StudioError::ResponseError(format!(
                "insert into {} returned no rows",
                table
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn select<R: DeserializeOwned>(
        &self,
        table: &str,
        filter: Option<(&str, String)>,
    ) -> Result<Vec<R>> {
        let mut query: Vec<(&str, String)> = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(filter) = filter {
            query.push(filter);
        }

        let response = self
            .client
            .get(self.table_url(table))
            .headers(self.headers.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| StudioError::StorageError(format!("Supabase select failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StudioError::StorageError(format!(
                "Error fetching {}: {}",
                table,
                Self::error_text(response).await
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StudioError::ResponseError(e.to_string()))
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadResult> {
        let size = bytes.len();
        let response = self
            .client
            .post(self.object_url(bucket, path))
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .map_err(|e| StudioError::StorageError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StudioError::StorageError(Self::error_text(response).await));
        }

        log::debug!("📦 Uploaded {} bytes to {}/{}", size, bucket, path);
        Ok(UploadResult {
            bucket: bucket.to_string(),
            path: path.to_string(),
            public_url: self.public_url(bucket, path),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/rest/v1/", self.base_url))
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| StudioError::StorageError(format!("Supabase health check failed: {}", e)))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl RecordStore for SupabaseStorage {
    async fn save_input_image(&self, record: InputImageInsert) -> Result<InputImage> {
        self.insert(INPUT_IMAGES, &record).await
    }

    async fn list_input_images(&self) -> Result<Vec<InputImage>> {
        self.select(INPUT_IMAGES, None).await
    }

    async fn save_generated_image(&self, record: GeneratedImageInsert) -> Result<GeneratedImage> {
        self.insert(GENERATED_IMAGES, &record).await
    }

    async fn list_generated_images(&self) -> Result<Vec<GeneratedImage>> {
        self.select(GENERATED_IMAGES, None).await
    }

    async fn list_generated_images_by_input(
        &self,
        input_id: &str,
    ) -> Result<Vec<GeneratedImage>> {
        self.select(GENERATED_IMAGES, Some(("input_id", format!("eq.{}", input_id))))
            .await
    }

    async fn save_lora_dataset(&self, record: LoraDatasetInsert) -> Result<LoraDataset> {
        self.insert(LORA_DATASETS, &record).await
    }

    async fn list_lora_datasets(&self) -> Result<Vec<LoraDataset>> {
        self.select(LORA_DATASETS, None).await
    }

    async fn delete_lora_dataset(&self, id: &str) -> Result<bool> {
        let response = self
            .client
            .delete(self.table_url(LORA_DATASETS))
            .headers(self.headers.clone())
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await
            .map_err(|e| StudioError::StorageError(format!("Supabase delete failed: {}", e)))?;

        if response.status().is_success() {
            Ok(true)
        } else {
            log::error!(
                "❌ Error deleting LoRA dataset {}: {}",
                id,
                Self::error_text(response).await
            );
            Ok(false)
        }
    }
}
