use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::image::{Img2ImgRequest, ImageSource, MaskImage};
use crate::error::{Result, StudioError};

pub const DENOISING_RANGE: (f32, f32) = (0.1, 1.0);
pub const GUIDANCE_RANGE: (f32, f32) = (1.0, 20.0);

/// Reproducibility seed. `-1` (or any negative value) on the wire means
/// "let the provider pick".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Seed {
    #[default]
    Random,
    Fixed(u64),
}

impl Seed {
    pub fn from_i64(value: i64) -> Self {
        if value < 0 {
            Seed::Random
        } else {
            Seed::Fixed(value as u64)
        }
    }

    /// Parses a typed-in seed; anything unparseable falls back to random.
    pub fn parse(input: &str) -> Self {
        input
            .trim()
            .parse::<i64>()
            .map(Seed::from_i64)
            .unwrap_or(Seed::Random)
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Seed::Random => -1,
            Seed::Fixed(v) => i64::try_from(*v).unwrap_or(i64::MAX),
        }
    }

    pub fn fixed(&self) -> Option<u64> {
        match self {
            Seed::Random => None,
            Seed::Fixed(v) => Some(*v),
        }
    }

    /// The seed as sent on the wire, where negatives mean random. A fixed
    /// seed above `i64::MAX` would wrap into that range, so it is rejected.
    pub fn wire_value(&self) -> Result<Option<i64>> {
        self.fixed()
            .map(|v| {
                i64::try_from(v).map_err(|_| {
                    StudioError::ValidationError(format!("Seed {} is out of range", v))
                })
            })
            .transpose()
    }
}

pub fn clamp_denoising(value: f32) -> f32 {
    value.clamp(DENOISING_RANGE.0, DENOISING_RANGE.1)
}

pub fn clamp_guidance(value: f32) -> f32 {
    value.clamp(GUIDANCE_RANGE.0, GUIDANCE_RANGE.1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub image: ImageSource,
    pub mask: Option<MaskImage>,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: String,
    pub controlnet_module: Option<String>,
    pub denoising_strength: f32,
    pub guidance_scale: f32,
    pub seed: Seed,
}

impl GenerationRequest {
    pub fn image_url(&self) -> Result<&str> {
        self.image.url().ok_or_else(|| {
            StudioError::ValidationError("Image must be uploaded before generation".into())
        })
    }

    /// The JSON body sent to the img2img backend. A random seed is left out
    /// entirely rather than sent as `-1`.
    pub fn to_wire(&self) -> Result<Img2ImgRequest> {
        Ok(Img2ImgRequest {
            image_url: Some(self.image_url()?.to_string()),
            prompt: Some(self.prompt.clone()),
            negative_prompt: self.negative_prompt.clone(),
            denoising_strength: Some(self.denoising_strength),
            guidance_scale: Some(self.guidance_scale),
            seed: self.seed.wire_value()?,
            model: Some(self.model.clone()),
        })
    }
}

/// One finished generation as kept in the session history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub id: String,
    pub output_url: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: String,
    pub controlnet_module: Option<String>,
    pub denoising_strength: f32,
    pub guidance_scale: f32,
    pub seed: Seed,
    pub has_mask: bool,
    pub created_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn from_request(request: &GenerationRequest, output_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            output_url: output_url.into(),
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            model: request.model.clone(),
            controlnet_module: request.controlnet_module.clone(),
            denoising_strength: request.denoising_strength,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
            has_mask: request.mask.is_some(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seed: Seed) -> GenerationRequest {
        GenerationRequest {
            image: ImageSource::Url("https://x/in.png".into()),
            mask: None,
            prompt: "a lighthouse".into(),
            negative_prompt: None,
            model: "flux-dev".into(),
            controlnet_module: Some("canny".into()),
            denoising_strength: 0.7,
            guidance_scale: 7.5,
            seed,
        }
    }

    #[test]
    fn test_seed_conversions() {
        assert_eq!(Seed::from_i64(-1), Seed::Random);
        assert_eq!(Seed::from_i64(42), Seed::Fixed(42));
        assert_eq!(Seed::parse("abc"), Seed::Random);
        assert_eq!(Seed::parse(" 7 "), Seed::Fixed(7));
        assert_eq!(Seed::Random.as_i64(), -1);
    }

    #[test]
    fn test_wire_never_carries_random_seed() {
        let wire = request(Seed::Random).to_wire().unwrap();
        assert_eq!(wire.seed, None);
        let body = serde_json::to_value(&wire).unwrap();
        assert!(body.get("seed").is_none());

        let wire = request(Seed::Fixed(1234)).to_wire().unwrap();
        assert_eq!(wire.seed, Some(1234));
    }

    #[test]
    fn test_oversized_seed_is_rejected() {
        assert_eq!(
            Seed::Fixed(i64::MAX as u64).wire_value().unwrap(),
            Some(i64::MAX)
        );
        assert!(matches!(
            Seed::Fixed(u64::MAX).wire_value(),
            Err(StudioError::ValidationError(_))
        ));
        assert!(request(Seed::Fixed(i64::MAX as u64 + 1)).to_wire().is_err());
        assert_eq!(Seed::Random.wire_value().unwrap(), None);
    }

    #[test]
    fn test_blob_image_has_no_url() {
        let mut req = request(Seed::Random);
        req.image = ImageSource::Blob {
            bytes: vec![0],
            filename: "a.png".into(),
        };
        assert!(matches!(req.to_wire(), Err(StudioError::ValidationError(_))));
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_denoising(0.0), 0.1);
        assert_eq!(clamp_denoising(1.5), 1.0);
        assert_eq!(clamp_guidance(0.5), 1.0);
        assert_eq!(clamp_guidance(30.0), 20.0);
        assert_eq!(clamp_guidance(7.5), 7.5);
    }

    #[test]
    fn test_result_echoes_request() {
        let result = GenerationResult::from_request(&request(Seed::Fixed(9)), "https://x/out.webp");
        assert_eq!(result.prompt, "a lighthouse");
        assert_eq!(result.seed, Seed::Fixed(9));
        assert_eq!(result.controlnet_module.as_deref(), Some("canny"));
        assert!(!result.has_mask);
    }
}
