use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::backend::GenerationBackend;
use crate::{
    error::{Result, StudioError},
    logger,
    models::{
        FluxInput, GenerationParams, Img2ImgRequest, Img2ImgResponse, Seed, DEFAULT_GUIDANCE,
        DEFAULT_MODEL_NAME, DEFAULT_PROMPT_STRENGTH,
    },
    replicate::ImageProvider,
    storage::ObjectStorage,
};

pub const OUTPUT_CONTENT_TYPE: &str = "image/webp";
pub const OUTPUT_PREFIX: &str = "generated";

/// The img2img pipeline: run the provider, copy its output into our bucket,
/// hand back the public URL. One attempt per call.
#[derive(Clone)]
pub struct GenerationService {
    provider: Arc<dyn ImageProvider>,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
}

// `0`, NaN and absent all mean "use the default", as the web client sends them.
fn non_zero(value: Option<f32>) -> Option<f32> {
    value.filter(|v| *v != 0.0 && !v.is_nan())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub fn generated_file_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "generated_{}_{}.webp",
        Utc::now().timestamp_millis(),
        &suffix[..6]
    )
}

impl GenerationService {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            storage,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Builds the provider input, applying defaults for omitted fields.
    /// A negative seed is dropped so the provider picks its own.
    pub fn build_input(request: &Img2ImgRequest) -> Result<FluxInput> {
        let (Some(image_url), Some(prompt)) =
            (non_empty(&request.image_url), non_empty(&request.prompt))
        else {
            return Err(StudioError::ValidationError(
                "imageUrl and prompt are required".into(),
            ));
        };

        let mut input = FluxInput::new(image_url, prompt);
        input.guidance = non_zero(request.guidance_scale).unwrap_or(DEFAULT_GUIDANCE);
        input.prompt_strength =
            non_zero(request.denoising_strength).unwrap_or(DEFAULT_PROMPT_STRENGTH);
        input.seed = request.seed.and_then(|s| Seed::from_i64(s).fixed());
        Ok(input)
    }

    pub fn echo_params(request: &Img2ImgRequest) -> GenerationParams {
        GenerationParams {
            prompt: request.prompt.clone().unwrap_or_default(),
            negative_prompt: request.negative_prompt.clone(),
            denoising_strength: request.denoising_strength,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
            model: non_empty(&request.model)
                .unwrap_or(DEFAULT_MODEL_NAME)
                .to_string(),
        }
    }

    pub async fn generate(&self, request: &Img2ImgRequest) -> Result<Img2ImgResponse> {
        let input = Self::build_input(request)?;
        let _timer = logger::timer("img2img generation");

        log::info!(
            "🎨 Starting img2img generation: prompt={:?} model={:?} denoising={:?}",
            input.prompt,
            request.model,
            request.denoising_strength
        );

        let outputs = self.provider.run(&input).await?;
        let generated_url = outputs.first().ok_or_else(|| {
            StudioError::ProviderError("No output generated from Replicate".into())
        })?;
        log::info!("✅ Replicate generation completed: {}", generated_url);

        let bytes = self.provider.download(generated_url).await?;

        let path = format!("{}/{}", OUTPUT_PREFIX, generated_file_name());
        let upload = self
            .storage
            .upload(&self.bucket, &path, bytes, OUTPUT_CONTENT_TYPE, false)
            .await
            .map_err(|e| {
                log::error!("❌ Upload error: {}", e);
                StudioError::StorageError(format!("Failed to upload to storage: {}", e.message()))
            })?;

        log::info!("📦 Image uploaded successfully: {}", upload.public_url);

        Ok(Img2ImgResponse {
            success: true,
            output_url: upload.public_url,
            generation_params: Self::echo_params(request),
        })
    }
}

#[async_trait]
impl GenerationBackend for GenerationService {
    async fn generate(&self, request: &Img2ImgRequest) -> Result<Img2ImgResponse> {
        GenerationService::generate(self, request).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Mutex;

    /// Records every input and answers with canned outputs.
    pub(crate) struct FakeProvider {
        pub outputs: Vec<String>,
        pub inputs: Mutex<Vec<FluxInput>>,
        pub downloads: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        pub(crate) fn returning(outputs: &[&str]) -> Self {
            Self {
                outputs: outputs.iter().map(|s| s.to_string()).collect(),
                inputs: Mutex::new(Vec::new()),
                downloads: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageProvider for FakeProvider {
        async fn run(&self, input: &FluxInput) -> Result<Vec<String>> {
            self.inputs.lock().unwrap().push(input.clone());
            Ok(self.outputs.clone())
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.downloads.lock().unwrap().push(url.to_string());
            Ok(b"RIFF-webp-bytes".to_vec())
        }
    }

    fn request() -> Img2ImgRequest {
        Img2ImgRequest {
            image_url: Some("https://cdn.example/in.png".into()),
            prompt: Some("a red bicycle".into()),
            ..Default::default()
        }
    }

    fn service(provider: Arc<FakeProvider>, storage: Arc<MemoryStorage>) -> GenerationService {
        GenerationService::new(provider, storage, "bucket1")
    }

    #[test]
    fn test_build_input_defaults() {
        let input = GenerationService::build_input(&request()).unwrap();
        assert_eq!(input.guidance, 3.5);
        assert_eq!(input.prompt_strength, 0.8);
        assert_eq!(input.num_inference_steps, 28);
        assert_eq!(input.output_quality, 80);
        assert_eq!(input.seed, None);

        let mut req = request();
        req.guidance_scale = Some(0.0);
        req.denoising_strength = Some(0.45);
        let input = GenerationService::build_input(&req).unwrap();
        assert_eq!(input.guidance, 3.5);
        assert_eq!(input.prompt_strength, 0.45);
    }

    #[test]
    fn test_random_seed_is_never_forwarded() {
        let mut req = request();
        req.seed = Some(-1);
        assert_eq!(GenerationService::build_input(&req).unwrap().seed, None);
        let body = serde_json::to_value(GenerationService::build_input(&req).unwrap()).unwrap();
        assert!(body.get("seed").is_none());

        req.seed = Some(1234);
        assert_eq!(GenerationService::build_input(&req).unwrap().seed, Some(1234));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut req = request();
        req.prompt = Some(String::new());
        assert!(matches!(
            GenerationService::build_input(&req),
            Err(StudioError::ValidationError(_))
        ));
        let mut req = request();
        req.image_url = None;
        assert!(GenerationService::build_input(&req).is_err());
    }

    #[tokio::test]
    async fn test_generate_uploads_output() {
        let provider = Arc::new(FakeProvider::returning(&["https://replicate.delivery/out.webp"]));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(provider.clone(), storage.clone());

        let mut req = request();
        req.seed = Some(77);
        let response = svc.generate(&req).await.unwrap();

        assert!(response.success);
        assert!(response
            .output_url
            .starts_with("memory://bucket1/generated/generated_"));
        assert!(response.output_url.ends_with(".webp"));
        assert_eq!(response.generation_params.model, "flux-dev");
        assert_eq!(response.generation_params.seed, Some(77));
        assert_eq!(
            provider.downloads.lock().unwrap().as_slice(),
            ["https://replicate.delivery/out.webp".to_string()]
        );

        let path = response
            .output_url
            .trim_start_matches("memory://bucket1/")
            .to_string();
        let stored = storage.object("bucket1", &path).await.unwrap();
        assert_eq!(stored.content_type, "image/webp");
        assert_eq!(stored.bytes, b"RIFF-webp-bytes".to_vec());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_provider() {
        let provider = Arc::new(FakeProvider::returning(&["https://r/out.webp"]));
        let svc = service(provider.clone(), Arc::new(MemoryStorage::new()));
        let mut req = request();
        req.image_url = None;
        assert!(svc.generate(&req).await.is_err());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_provider_error() {
        let provider = Arc::new(FakeProvider::returning(&[]));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(provider, storage.clone());
        let err = svc.generate(&request()).await.unwrap_err();
        assert_eq!(err.message(), "No output generated from Replicate");
        assert_eq!(storage.object_count().await, 0);
    }

    struct FailingStorage;

    #[async_trait]
    impl ObjectStorage for FailingStorage {
        async fn upload(
            &self,
            _bucket: &str,
            _path: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
            _upsert: bool,
        ) -> Result<crate::models::UploadResult> {
            Err(StudioError::StorageError("Bucket not found".into()))
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("none://{}/{}", bucket, path)
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let provider = Arc::new(FakeProvider::returning(&["https://r/out.webp"]));
        let svc = GenerationService::new(provider, Arc::new(FailingStorage), "bucket1");
        let err = svc.generate(&request()).await.unwrap_err();
        assert!(matches!(err, StudioError::StorageError(_)));
        assert_eq!(err.message(), "Failed to upload to storage: Bucket not found");
    }
}
