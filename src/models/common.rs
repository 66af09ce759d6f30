use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ModelCategory,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Base,
    ControlNet,
}

impl ModelInfo {
    fn new(id: &str, name: &str, description: &str, category: ModelCategory) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category,
            is_default: false,
        }
    }

    fn default_choice(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Base models offered in the editor.
pub fn base_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new(
            "flux-dev",
            "FLUX Dev",
            "High quality, slower generation",
            ModelCategory::Base,
        )
        .default_choice(),
        ModelInfo::new(
            "flux-schnell",
            "FLUX Schnell",
            "Fast generation, good quality",
            ModelCategory::Base,
        ),
        ModelInfo::new(
            "sdxl-turbo",
            "SDXL Turbo",
            "Ultra-fast generation",
            ModelCategory::Base,
        ),
        ModelInfo::new(
            "realistic-vision-v5.1",
            "Realistic Vision v5.1",
            "High-quality photorealistic model",
            ModelCategory::Base,
        ),
        ModelInfo::new(
            "dreamshaper-v8",
            "DreamShaper v8",
            "Versatile photorealism",
            ModelCategory::Base,
        ),
    ]
}

pub fn controlnet_modules() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new(
            "openpose",
            "openpose",
            "Human pose detection",
            ModelCategory::ControlNet,
        ),
        ModelInfo::new("canny", "canny", "Edge detection", ModelCategory::ControlNet),
    ]
}

pub fn default_base_model() -> Option<ModelInfo> {
    base_models().into_iter().find(|m| m.is_default)
}
