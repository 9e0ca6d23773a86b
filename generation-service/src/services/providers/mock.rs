//! Mock provider implementation for tests and local runs.

use super::{GeneratedImage, ImageGenerationInput, ImageProvider, ProviderError, ProviderOutput};
use async_trait::async_trait;
use std::sync::Mutex;

enum Behavior {
    /// Fresh request id per call, so every call records a new generation.
    Unique,
    Fixed(ProviderOutput),
    Fail(String),
}

/// Mock image provider that records every input it receives.
pub struct MockImageProvider {
    behavior: Behavior,
    calls: Mutex<Vec<ImageGenerationInput>>,
}

impl MockImageProvider {
    pub fn new() -> Self {
        Self::with_behavior(Behavior::Unique)
    }

    /// Always return `output`.
    pub fn returning(output: ProviderOutput) -> Self {
        Self::with_behavior(Behavior::Fixed(output))
    }

    /// Always fail with an API error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail(message.into()))
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }

    /// Inputs received so far, oldest first.
    pub fn calls(&self) -> Vec<ImageGenerationInput> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl Default for MockImageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, input: &ImageGenerationInput) -> Result<ProviderOutput, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(input.clone());
        }

        match &self.behavior {
            Behavior::Unique => {
                let request_id = format!("mock-{}", uuid::Uuid::new_v4());
                Ok(ProviderOutput {
                    images: vec![GeneratedImage {
                        url: format!("https://fal.media/mock/{}.png", request_id),
                        width: Some(1024),
                        height: Some(576),
                        content_type: Some("image/png".to_string()),
                    }],
                    seed: Some(42),
                    request_id,
                })
            }
            Behavior::Fixed(output) => Ok(output.clone()),
            Behavior::Fail(message) => Err(ProviderError::ApiError(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_mints_request_ids() {
        let provider = MockImageProvider::new();
        let input = ImageGenerationInput::new("a red fox", Vec::new(), 25);

        let first = provider.generate(&input).await.unwrap();
        let second = provider.generate(&input).await.unwrap();

        assert_ne!(first.request_id, second.request_id);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.calls()[0], input);
    }

    #[tokio::test]
    async fn failing_mock_returns_api_error() {
        let provider = MockImageProvider::failing("quota exceeded");
        let input = ImageGenerationInput::new("a red fox", Vec::new(), 25);

        let err = provider.generate(&input).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError(ref m) if m == "quota exceeded"));
        assert_eq!(provider.call_count(), 1);
    }
}
