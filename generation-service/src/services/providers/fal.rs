//! fal.ai provider implementation.
//!
//! Uses fal's queue API: submit the input, poll the status URL until the
//! request completes, then fetch the result from the response URL.

use super::{GeneratedImage, ImageGenerationInput, ImageProvider, ProviderError, ProviderOutput};
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// Per-call HTTP timeout; the overall wait is bounded by `FalConfig::max_wait`.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// fal provider configuration.
#[derive(Debug)]
pub struct FalConfig {
    pub api_key: Secret<String>,
    /// Queue base URL, e.g. `https://queue.fal.run`.
    pub queue_url: String,
    /// Endpoint id, e.g. `fal-ai/z-image/turbo/lora`.
    pub model: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

/// fal image provider.
pub struct FalImageProvider {
    config: FalConfig,
    client: Client,
}

impl FalImageProvider {
    pub fn new(config: FalConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured("FAL_KEY is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn submit_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.queue_url.trim_end_matches('/'),
            self.config.model.trim_start_matches('/')
        )
    }

    fn authorization(&self) -> String {
        format!("Key {}", self.config.api_key.expose_secret())
    }

    async fn submit(&self, input: &ImageGenerationInput) -> Result<QueueSubmission, ProviderError> {
        let response = self
            .client
            .post(self.submit_url())
            .header("Authorization", self.authorization())
            .json(input)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        read_json(response).await
    }

    async fn wait_for_completion(&self, submission: &QueueSubmission) -> Result<(), ProviderError> {
        let deadline = Instant::now() + self.config.max_wait;

        loop {
            let response = self
                .client
                .get(&submission.status_url)
                .header("Authorization", self.authorization())
                .send()
                .await
                .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
            let status: QueueStatus = read_json(response).await?;

            match status.status.as_str() {
                "COMPLETED" => return Ok(()),
                "IN_QUEUE" | "IN_PROGRESS" => {
                    tracing::trace!(
                        request_id = %submission.request_id,
                        status = %status.status,
                        queue_position = ?status.queue_position,
                        "Waiting for fal request"
                    );
                }
                other => {
                    return Err(ProviderError::ApiError(format!(
                        "Unexpected queue status '{}' for request {}",
                        other, submission.request_id
                    )));
                }
            }

            if Instant::now() >= deadline {
                return Err(ProviderError::Timeout(self.config.max_wait));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn fetch_result(&self, submission: &QueueSubmission) -> Result<FalResult, ProviderError> {
        let response = self
            .client
            .get(&submission.response_url)
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        read_json(response).await
    }
}

#[async_trait]
impl ImageProvider for FalImageProvider {
    fn name(&self) -> &'static str {
        "fal"
    }

    #[tracing::instrument(skip(self, input), fields(model = %self.config.model, steps = input.num_inference_steps))]
    async fn generate(&self, input: &ImageGenerationInput) -> Result<ProviderOutput, ProviderError> {
        tracing::debug!(
            prompt_len = input.prompt.len(),
            lora_count = input.loras.as_ref().map_or(0, Vec::len),
            "Submitting request to fal queue"
        );

        let submission = self.submit(input).await?;
        tracing::debug!(request_id = %submission.request_id, "fal request queued");

        self.wait_for_completion(&submission).await?;
        let result = self.fetch_result(&submission).await?;

        Ok(ProviderOutput {
            images: result.images,
            seed: result.seed,
            request_id: submission.request_id,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        return Err(ProviderError::ApiError(format!(
            "fal API error {}: {}",
            status, error_text
        )));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))
}

// ============================================================================
// fal queue API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueueSubmission {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
    #[serde(default)]
    queue_position: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FalResult {
    #[serde(default)]
    images: Vec<GeneratedImage>,
    #[serde(default)]
    seed: Option<u64>,
}
