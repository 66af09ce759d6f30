use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::backend::GenerationBackend;
use crate::{
    config::DEFAULT_BUCKET,
    error::{Result, StudioError},
    models::{
        clamp_denoising, clamp_guidance, default_base_model, GeneratedImageInsert,
        GenerationRequest, GenerationResult, ImageSource, InputImageInsert, MaskImage, Seed,
        DEFAULT_INFERENCE_STEPS,
    },
    storage::{ObjectStorage, RecordStore},
};

pub const DEFAULT_DENOISING: f32 = 0.7;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;
const RANDOM_SEED_LIMIT: u128 = 1_000_000;
const NO_CONTROLNET: &str = "none";

/// Collaborators a session talks to when it submits.
#[derive(Clone)]
pub struct StudioContext {
    pub backend: Arc<dyn GenerationBackend>,
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub records: Option<Arc<dyn RecordStore>>,
    pub bucket: String,
}

impl StudioContext {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            storage: None,
            records: None,
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>) -> Self {
        self.storage = Some(storage);
        self.bucket = bucket.into();
        self
    }

    pub fn with_records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Puts a local upload into the bucket so the backend can fetch it.
    async fn upload_input(&self, bytes: &[u8], filename: &str) -> Result<String> {
        let storage = self.storage.as_ref().ok_or_else(|| {
            StudioError::ValidationError("Image must be uploaded before generation".into())
        })?;

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "png".to_string());
        let content_type = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            _ => "image/png",
        };
        let path = format!(
            "inputs/input_{}_{}.{}",
            Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..6],
            ext
        );

        let uploaded = storage
            .upload(&self.bucket, &path, bytes.to_vec(), content_type, false)
            .await?;
        Ok(uploaded.public_url)
    }
}

/// State transitions the editor UI sends to its session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ImageSelected(ImageSource),
    ImageRemoved,
    MaskSaved(MaskImage),
    PromptChanged(String),
    NegativePromptChanged(String),
    ModelChanged(String),
    ControlNetChanged(String),
    DenoisingChanged(f32),
    GuidanceChanged(f32),
    SeedChanged(i64),
    SeedEntered(String),
    RandomizeSeed,
    ResultReused(String),
}

/// Everything one editing session holds. History is newest first.
#[derive(Debug, Clone)]
pub struct EditorSession {
    image: Option<ImageSource>,
    mask: Option<MaskImage>,
    prompt: String,
    negative_prompt: String,
    model: String,
    controlnet_module: Option<String>,
    denoising_strength: f32,
    guidance_scale: f32,
    seed: Seed,
    generating: bool,
    // the image as it was when the in-flight request began
    submitted_image: Option<ImageSource>,
    history: Vec<GenerationResult>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self {
            image: None,
            mask: None,
            prompt: String::new(),
            negative_prompt: String::new(),
            model: default_base_model().map(|m| m.id).unwrap_or_default(),
            controlnet_module: None,
            denoising_strength: DEFAULT_DENOISING,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: Seed::Random,
            generating: false,
            submitted_image: None,
            history: Vec::new(),
        }
    }
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&ImageSource> {
        self.image.as_ref()
    }

    pub fn mask(&self) -> Option<&MaskImage> {
        self.mask.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn controlnet_module(&self) -> Option<&str> {
        self.controlnet_module.as_deref()
    }

    pub fn denoising_strength(&self) -> f32 {
        self.denoising_strength
    }

    pub fn guidance_scale(&self) -> f32 {
        self.guidance_scale
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn history(&self) -> &[GenerationResult] {
        &self.history
    }

    pub fn apply(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::ImageSelected(source) => {
                self.image = Some(source);
                self.mask = None;
                log::info!("🖼️  Image loaded - ready for editing");
            }
            SessionEvent::ImageRemoved => {
                self.image = None;
                self.mask = None;
            }
            SessionEvent::MaskSaved(mask) => {
                log::info!("🎭 Mask saved ({}x{})", mask.width, mask.height);
                self.mask = Some(mask);
            }
            SessionEvent::PromptChanged(prompt) => self.prompt = prompt,
            SessionEvent::NegativePromptChanged(prompt) => self.negative_prompt = prompt,
            SessionEvent::ModelChanged(model) => self.model = model,
            SessionEvent::ControlNetChanged(module) => {
                self.controlnet_module = Some(module).filter(|m| !m.is_empty() && m != NO_CONTROLNET);
            }
            SessionEvent::DenoisingChanged(v) => self.denoising_strength = clamp_denoising(v),
            SessionEvent::GuidanceChanged(v) => self.guidance_scale = clamp_guidance(v),
            SessionEvent::SeedChanged(v) => self.seed = Seed::from_i64(v),
            SessionEvent::SeedEntered(text) => self.seed = Seed::parse(&text),
            SessionEvent::RandomizeSeed => self.seed = random_seed(),
            SessionEvent::ResultReused(id) => {
                let result = self
                    .history
                    .iter()
                    .find(|r| r.id == id)
                    .ok_or_else(|| StudioError::ValidationError(format!("no result with id {}", id)))?;
                self.image = Some(ImageSource::Url(result.output_url.clone()));
                self.prompt = result.prompt.clone();
                self.negative_prompt = result.negative_prompt.clone().unwrap_or_default();
                self.mask = None;
                log::info!("♻️  Result loaded for further editing");
            }
        }
        Ok(())
    }

    /// Validates the form and marks the session busy. No I/O happens here;
    /// a failed check leaves the session untouched. A random seed is drawn
    /// now so the result records the seed that produced it.
    pub fn begin_submission(&mut self) -> Result<GenerationRequest> {
        if self.generating {
            return Err(StudioError::ValidationError(
                "A generation is already in progress".into(),
            ));
        }
        let image = match &self.image {
            Some(image) if !self.prompt.trim().is_empty() => image.clone(),
            _ => {
                return Err(StudioError::ValidationError(
                    "Please upload an image and enter a prompt".into(),
                ))
            }
        };
        if self.model.trim().is_empty() {
            return Err(StudioError::ValidationError("Please select a model".into()));
        }

        self.generating = true;
        self.submitted_image = Some(image.clone());
        let seed = match self.seed {
            Seed::Random => random_seed(),
            fixed => fixed,
        };
        Ok(GenerationRequest {
            image,
            mask: self.mask.clone(),
            prompt: self.prompt.clone(),
            negative_prompt: Some(self.negative_prompt.clone()).filter(|p| !p.is_empty()),
            model: self.model.clone(),
            controlnet_module: self.controlnet_module.clone(),
            denoising_strength: self.denoising_strength,
            guidance_scale: self.guidance_scale,
            seed,
        })
    }

    /// Clears the busy flag and, on success, records the result at the head
    /// of the history.
    pub fn finish_submission(
        &mut self,
        request: &GenerationRequest,
        outcome: Result<String>,
    ) -> Result<&GenerationResult> {
        self.generating = false;
        let submitted = self.submitted_image.take();
        let output_url = outcome.map_err(|e| {
            log::error!("❌ Generation failed: {}", e);
            e
        })?;

        // An uploaded blob is replaced by its URL, unless the user has since
        // picked another image.
        if request.image.url().is_some() && submitted.is_some() && self.image == submitted {
            self.image = Some(request.image.clone());
        }
        self.history
            .insert(0, GenerationResult::from_request(request, output_url));
        log::info!("✨ Image generated successfully");
        Ok(&self.history[0])
    }

    /// Validates, issues exactly one backend call and applies its outcome.
    pub async fn submit(&mut self, ctx: &StudioContext) -> Result<&GenerationResult> {
        let mut request = self.begin_submission()?;
        let outcome = dispatch(ctx, &mut request).await;
        self.finish_submission(&request, outcome)
    }
}

fn random_seed() -> Seed {
    Seed::Fixed((Uuid::new_v4().as_u128() % RANDOM_SEED_LIMIT) as u64)
}

async fn dispatch(ctx: &StudioContext, request: &mut GenerationRequest) -> Result<String> {
    let input_filename = match &request.image {
        ImageSource::Blob { bytes, filename } => {
            let url = ctx.upload_input(bytes, filename).await?;
            let name = filename.clone();
            request.image = ImageSource::Url(url);
            name
        }
        ImageSource::Url(_) => format!("input_{}.jpg", Utc::now().timestamp_millis()),
    };
    let wire = request.to_wire()?;

    let mut input_id = None;
    if let Some(records) = &ctx.records {
        let insert = InputImageInsert {
            url: request.image_url()?.to_string(),
            filename: Some(input_filename),
            prompt: Some(request.prompt.clone()),
        };
        match records.save_input_image(insert).await {
            Ok(row) => input_id = Some(row.id),
            Err(e) => log::warn!("⚠️  Error saving input image: {}", e),
        }
    }

    let response = ctx.backend.generate(&wire).await?;

    if let Some(records) = &ctx.records {
        let insert = GeneratedImageInsert {
            input_id,
            output_url: Some(response.output_url.clone()),
            model_name: Some(request.model.clone()),
            lora_used: None,
            tags: None,
            steps: Some(DEFAULT_INFERENCE_STEPS),
            seed: wire.seed,
            guidance_scale: Some(request.guidance_scale),
            denoise_strength: Some(request.denoising_strength),
        };
        if let Err(e) = records.save_generated_image(insert).await {
            log::warn!("⚠️  Error saving generated image: {}", e);
        }
    }

    Ok(response.output_url)
}
