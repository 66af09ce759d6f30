use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GUIDANCE: f32 = 3.5;
pub const DEFAULT_PROMPT_STRENGTH: f32 = 0.8;
pub const DEFAULT_INFERENCE_STEPS: u32 = 28;
pub const DEFAULT_OUTPUT_FORMAT: &str = "webp";
pub const DEFAULT_OUTPUT_QUALITY: u32 = 80;
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
pub const DEFAULT_MODEL_NAME: &str = "flux-dev";

/// A user-supplied picture: a URL, or the bytes of a local upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    Blob { bytes: Vec<u8>, filename: String },
}

impl ImageSource {
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageSource::Url(url) => Some(url),
            ImageSource::Blob { .. } => None,
        }
    }
}

/// A binary black/white mask, PNG-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl MaskImage {
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

/// Body accepted by the img2img backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Img2ImgRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoising_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Parameters echoed back by the backend alongside the output URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoising_strength: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub seed: Option<i64>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Img2ImgResponse {
    pub success: bool,
    pub output_url: String,
    pub generation_params: GenerationParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Input object for the FLUX img2img prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FluxInput {
    pub image: String,
    pub prompt: String,
    pub guidance: f32,
    pub num_outputs: u32,
    pub aspect_ratio: String,
    pub output_format: String,
    pub output_quality: u32,
    pub prompt_strength: f32,
    pub num_inference_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl FluxInput {
    pub fn new(image: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            prompt: prompt.into(),
            guidance: DEFAULT_GUIDANCE,
            num_outputs: 1,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            output_quality: DEFAULT_OUTPUT_QUALITY,
            prompt_strength: DEFAULT_PROMPT_STRENGTH,
            num_inference_steps: DEFAULT_INFERENCE_STEPS,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

impl Prediction {
    /// Output URLs; the model may return a single string or a list.
    pub fn output_urls(&self) -> Vec<String> {
        match &self.output {
            Some(serde_json::Value::String(url)) => vec![url.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {} ended with status {:?}", self.id, self.status),
        }
    }

    pub fn poll_url(&self) -> Option<&str> {
        self.urls.as_ref().and_then(|u| u.get.as_deref())
    }
}
