use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::prompt::{PROMPT_VERSION, TRADING_ANALYSIS_PROMPT};
use crate::models::NormalizedImage;

/// Prompt plus inline image, ready to hand to a [`VisionModel`](super::VisionModel).
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    prompt: &'static str,
    prompt_version: &'static str,
    image: NormalizedImage,
    data_url: String,
}

impl AnalysisRequest {
    pub fn prompt(&self) -> &str {
        self.prompt
    }

    pub fn prompt_version(&self) -> &str {
        self.prompt_version
    }

    pub fn image(&self) -> &NormalizedImage {
        &self.image
    }

    /// `data:<mime>;base64,<payload>`
    pub fn image_data_url(&self) -> &str {
        &self.data_url
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequestBuilder {
    prompt: &'static str,
    prompt_version: &'static str,
}

impl Default for AnalysisRequestBuilder {
    fn default() -> Self {
        Self {
            prompt: TRADING_ANALYSIS_PROMPT,
            prompt_version: PROMPT_VERSION,
        }
    }
}

impl AnalysisRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self, image: NormalizedImage) -> AnalysisRequest {
        let data_url = format!(
            "data:{};base64,{}",
            image.mime_type(),
            STANDARD.encode(&image.bytes)
        );
        AnalysisRequest {
            prompt: self.prompt,
            prompt_version: self.prompt_version,
            image,
            data_url,
        }
    }
}
