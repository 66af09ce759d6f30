use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde_json::json;

use super::ImageProvider;
use crate::{
    config::ReplicateConfig,
    error::{Result, StudioError},
    models::{FluxInput, Prediction, PredictionStatus},
};

#[derive(Clone)]
pub struct ReplicateClient {
    client: Client,
    config: ReplicateConfig,
}

impl ReplicateClient {
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| StudioError::ConfigError("REPLICATE_API_KEY is not configured".into()))
    }

    /// Endpoint and body for creating a prediction. `owner/name:version`
    /// targets a pinned version, `owner/name` the model's latest.
    fn prediction_request(&self, input: &FluxInput) -> (String, serde_json::Value) {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", base),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", base, self.config.model),
                json!({ "input": input }),
            ),
        }
    }

    async fn fetch_prediction(&self, url: &str, api_key: &str) -> Result<Prediction> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .send()
            .await?;
        Self::parse_prediction(response).await
    }

    async fn parse_prediction(response: reqwest::Response) -> Result<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StudioError::ProviderError(format!(
                "Replicate returned HTTP {}: {}",
                status, body
            )));
        }
        response
            .json::<Prediction>()
            .await
            .map_err(|e| StudioError::ResponseError(e.to_string()))
    }
}

#[async_trait]
impl ImageProvider for ReplicateClient {
    async fn run(&self, input: &FluxInput) -> Result<Vec<String>> {
        let api_key = self.api_key()?;
        let (url, body) = self.prediction_request(input);

        log::info!("🎨 Creating prediction on {}", self.config.model);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction = Self::parse_prediction(response).await?;

        let mut polls = 0;
        while !prediction.status.is_terminal() {
            if polls >= self.config.max_polls {
                return Err(StudioError::ProviderError(format!(
                    "prediction {} still {:?} after {} polls",
                    prediction.id, prediction.status, polls
                )));
            }
            let poll_url = prediction.poll_url().map(String::from).ok_or_else(|| {
                StudioError::ResponseError("prediction has no polling URL".into())
            })?;
            tokio::time::sleep(self.config.poll_interval).await;
            prediction = self.fetch_prediction(&poll_url, api_key).await?;
            polls += 1;
            log::debug!("🔄 Prediction {} is {:?}", prediction.id, prediction.status);
        }

        match prediction.status {
            PredictionStatus::Succeeded => Ok(prediction.output_urls()),
            _ => Err(StudioError::ProviderError(prediction.error_message())),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(StudioError::ProviderError(
                "Failed to download generated image".into(),
            ));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CREATE_PATH: &str = "/v1/models/black-forest-labs/flux-dev/predictions";

    fn mock_client(server: &MockServer, max_polls: u32) -> ReplicateClient {
        ReplicateClient::new(
            ReplicateConfig::new()
                .with_api_key("r8_test")
                .with_base_url(format!("{}/v1", server.uri()))
                .with_polling(Duration::from_millis(1), max_polls),
        )
    }

    fn prediction(server: &MockServer, status: &str) -> serde_json::Value {
        json!({
            "id": "p1",
            "status": status,
            "urls": { "get": format!("{}/v1/predictions/p1", server.uri()) }
        })
    }

    #[test]
    fn test_prediction_endpoint_for_model() {
        let client = ReplicateClient::new(ReplicateConfig::new().with_api_key("k"));
        let (url, body) = client.prediction_request(&FluxInput::new("https://x/a.png", "cat"));
        assert_eq!(
            url,
            "https://api.replicate.com/v1/models/black-forest-labs/flux-dev/predictions"
        );
        assert_eq!(body["input"]["prompt"], "cat");
        assert!(body.get("version").is_none());
    }

    #[test]
    fn test_prediction_endpoint_for_version() {
        let client = ReplicateClient::new(
            ReplicateConfig::new()
                .with_model("black-forest-labs/flux-dev:abc123")
                .with_base_url("http://localhost:9999/v1/"),
        );
        let (url, body) = client.prediction_request(&FluxInput::new("https://x/a.png", "cat"));
        assert_eq!(url, "http://localhost:9999/v1/predictions");
        assert_eq!(body["version"], "abc123");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let client = ReplicateClient::new(ReplicateConfig::new());
        let err = client
            .run(&FluxInput::new("https://x/a.png", "cat"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "REPLICATE_API_KEY is not configured");
    }

    #[tokio::test]
    async fn test_polls_until_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .and(header("authorization", "Bearer r8_test"))
            .and(header("prefer", "wait"))
            .and(body_partial_json(json!({ "input": { "prompt": "cat", "num_inference_steps": 28 } })))
            .respond_with(ResponseTemplate::new(201).set_body_json(prediction(&server, "starting")))
            .expect(1)
            .mount(&server)
            .await;

        let mut done = prediction(&server, "succeeded");
        done["output"] = json!(["https://replicate.delivery/out.webp"]);
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(done))
            .expect(1)
            .mount(&server)
            .await;

        let outputs = mock_client(&server, 5)
            .run(&FluxInput::new("https://x/a.png", "cat"))
            .await
            .unwrap();
        assert_eq!(outputs, vec!["https://replicate.delivery/out.webp".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_prediction_is_provider_error() {
        let server = MockServer::start().await;
        let mut failed = prediction(&server, "failed");
        failed["error"] = json!("NSFW content detected");
        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(failed))
            .mount(&server)
            .await;

        let err = mock_client(&server, 5)
            .run(&FluxInput::new("https://x/a.png", "cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::ProviderError(_)));
        assert_eq!(err.message(), "NSFW content detected");
    }

    #[tokio::test]
    async fn test_canceled_prediction_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(prediction(&server, "processing")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction(&server, "canceled")))
            .mount(&server)
            .await;

        let err = mock_client(&server, 5)
            .run(&FluxInput::new("https://x/a.png", "cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::ProviderError(_)));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_polls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(prediction(&server, "starting")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction(&server, "processing")))
            .expect(2)
            .mount(&server)
            .await;

        let err = mock_client(&server, 2)
            .run(&FluxInput::new("https://x/a.png", "cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::ProviderError(_)));
        assert!(err.message().contains("after 2 polls"));
    }

    #[tokio::test]
    async fn test_create_rejected_by_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthenticated"))
            .mount(&server)
            .await;

        let err = mock_client(&server, 5)
            .run(&FluxInput::new("https://x/a.png", "cat"))
            .await
            .unwrap_err();
        assert!(err.message().contains("401"));
        assert!(err.message().contains("Unauthenticated"));
    }

    #[tokio::test]
    async fn test_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.webp"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = mock_client(&server, 5);
        let bytes = client
            .download(&format!("{}/out.webp", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"RIFF".to_vec());

        let err = client
            .download(&format!("{}/gone.webp", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Failed to download generated image");
    }
}
