use crate::error::GenerateError;
use crate::services::{GenerationRequest, GenerationResult, DEFAULT_INFERENCE_STEPS};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: Option<String>,

    pub user_id: Option<String>,

    #[serde(default)]
    pub lora_ids: Option<Vec<String>>,

    #[validate(range(min = 1, message = "numInferenceSteps must be at least 1"))]
    pub num_inference_steps: Option<u32>,
}

impl GenerateRequest {
    /// Validate and normalize. Prompt errors win over every other check.
    pub fn into_generation_request(self) -> Result<GenerationRequest, GenerateError> {
        let prompt = match self.prompt.as_deref() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(GenerateError::MissingPrompt),
        };

        self.validate().map_err(|errors| {
            let message = errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .next()
                .unwrap_or_else(|| errors.to_string());
            GenerateError::InvalidRequest(message)
        })?;

        Ok(GenerationRequest {
            prompt,
            user_id: self.user_id.filter(|id| !id.is_empty()),
            lora_ids: self.lora_ids.unwrap_or_default(),
            num_inference_steps: self.num_inference_steps.unwrap_or(DEFAULT_INFERENCE_STEPS),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub image: Option<String>,
    pub seed: Option<u64>,
    pub model: &'static str,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            success: true,
            image: result.image,
            seed: result.seed,
            model: result.model,
        }
    }
}
