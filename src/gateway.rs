//! Generation gateway: the seam between the conversation store and the remote service.
//!
//! The store only talks to [`GenerationGateway`]. [`GeminiGateway`] is the production
//! implementation; it never lets a transport failure escape, answering with a fixed
//! fallback text instead. Tests inject their own implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::ai::gemini::{GeminiClient, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::error::Result;
use crate::media::{self, PendingImage};

pub const TEXT_FALLBACK: &str = "Sorry, I couldn't process that request. Please try again.";
pub const NO_IMAGE_FALLBACK: &str = "Sorry, I couldn't generate an image. Please try a different prompt.";
pub const IMAGE_ERROR_FALLBACK: &str =
    "Sorry, there was an error generating the image. The model may have safety restrictions.";

/// An image returned by the image model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub base64: String,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn data_uri(&self) -> String {
        media::data_uri(&self.mime_type, &self.base64)
    }
}

/// Result of an image request: either an image or a reason to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Image(GeneratedImage),
    Failure(String),
}

#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Generate a reply to a single prompt, optionally about one image.
    async fn generate_text(&self, prompt: &str, image: Option<&PendingImage>) -> Result<String>;

    /// Generate one square PNG for a prompt.
    async fn generate_image(&self, prompt: &str) -> Result<ImageOutcome>;
}

/// Gateway backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiGateway {
    client: GeminiClient,
    text_model: String,
    image_model: String,
}

impl GeminiGateway {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_models(mut self, text_model: &str, image_model: &str) -> Self {
        self.text_model = text_model.to_string();
        self.image_model = image_model.to_string();
        self
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn generate_text(&self, prompt: &str, image: Option<&PendingImage>) -> Result<String> {
        match self.client.generate_content(&self.text_model, prompt, image).await {
            Ok(text) => Ok(text),
            Err(e) => {
                error!(model = %self.text_model, error = %e, "error generating text");
                Ok(TEXT_FALLBACK.to_string())
            }
        }
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageOutcome> {
        match self.client.generate_images(&self.image_model, prompt, 1).await {
            Ok(images) => match images.into_iter().next() {
                Some(image) => Ok(ImageOutcome::Image(image)),
                None => {
                    warn!(model = %self.image_model, "image model returned no images");
                    Ok(ImageOutcome::Failure(NO_IMAGE_FALLBACK.to_string()))
                }
            },
            Err(e) => {
                error!(model = %self.image_model, error = %e, "error generating image");
                Ok(ImageOutcome::Failure(IMAGE_ERROR_FALLBACK.to_string()))
            }
        }
    }
}
