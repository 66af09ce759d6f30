use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, StatusCode,
};

use crate::{
    config::BackendConfig,
    error::{Result, StudioError},
    models::{ErrorBody, Img2ImgRequest, Img2ImgResponse},
};

/// Anything that can turn an img2img request into a stored output image.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &Img2ImgRequest) -> Result<Img2ImgResponse>;
}

/// Calls a deployed img2img function over HTTP.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    function_url: String,
    headers: HeaderMap,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let function_url = config
            .function_url
            .clone()
            .ok_or_else(|| StudioError::ConfigError("ORAU_FUNCTION_URL is not configured".into()))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let invalid =
                |e: reqwest::header::InvalidHeaderValue| StudioError::ConfigError(e.to_string());
            headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
            );
        }

        Ok(Self {
            client: Client::new(),
            function_url,
            headers,
        })
    }

    /// Maps a function response onto the crate's result type.
    pub fn interpret(status: StatusCode, body: &str) -> Result<Img2ImgResponse> {
        if status.is_success() {
            let response: Img2ImgResponse = serde_json::from_str(body)
                .map_err(|e| StudioError::ResponseError(format!("unexpected response: {}", e)))?;
            if !response.success {
                return Err(StudioError::RequestError("Generation failed".into()));
            }
            return Ok(response);
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("HTTP {}", status));
        if status == StatusCode::BAD_REQUEST {
            Err(StudioError::ValidationError(message))
        } else {
            Err(StudioError::RequestError(message))
        }
    }
}

#[async_trait]
impl GenerationBackend for BackendClient {
    async fn generate(&self, request: &Img2ImgRequest) -> Result<Img2ImgResponse> {
        log::debug!("📤 POST {}", self.function_url);
        let response = self
            .client
            .post(&self.function_url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::interpret(status, &body)
    }
}
