//! Image provider abstractions and implementations.
//!
//! The relay talks to exactly one provider per process; tests and local runs
//! swap the fal.ai client for the mock through the same trait.

pub mod fal;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Aspect ratio requested for every generation.
pub const IMAGE_SIZE: &str = "landscape_16_9";

/// Classifier-free guidance scale requested for every generation.
pub const GUIDANCE_SCALE: f64 = 7.5;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out after {0:?} waiting for the provider")]
    Timeout(Duration),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::Timeout(_) => "timeout",
        }
    }
}

/// Input sent to the provider.
///
/// `loras` is left out of the payload entirely when no adapters were
/// requested; the provider treats a missing field differently from `[]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageGenerationInput {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loras: Option<Vec<String>>,
    pub num_inference_steps: u32,
    pub image_size: &'static str,
    pub guidance_scale: f64,
}

impl ImageGenerationInput {
    pub fn new(prompt: impl Into<String>, lora_ids: Vec<String>, num_inference_steps: u32) -> Self {
        Self {
            prompt: prompt.into(),
            loras: if lora_ids.is_empty() {
                None
            } else {
                Some(lora_ids)
            },
            num_inference_steps,
            image_size: IMAGE_SIZE,
            guidance_scale: GUIDANCE_SCALE,
        }
    }
}

/// One image in a provider result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Result of a provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub images: Vec<GeneratedImage>,
    pub seed: Option<u64>,
    /// Provider-assigned identifier for this request.
    pub request_id: String,
}

impl ProviderOutput {
    /// URL of the first image, if the provider returned any.
    pub fn first_image_url(&self) -> Option<&str> {
        self.images.first().map(|image| image.url.as_str())
    }
}

/// Trait for image generation providers (e.g., fal.ai).
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Run one generation and wait for its result.
    async fn generate(&self, input: &ImageGenerationInput) -> Result<ProviderOutput, ProviderError>;
}
