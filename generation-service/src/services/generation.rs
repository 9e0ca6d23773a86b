//! Generation orchestration: call the provider, then record and charge.

use crate::error::GenerateError;
use crate::models::{Generation, NewGeneration, GENERATION_CHARGE, MODEL_LABEL};
use crate::services::providers::{ImageGenerationInput, ImageProvider};
use crate::services::store::{DebitPolicy, GenerationStore, RecordOutcome};
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Default denoising step count when the client does not ask for one.
pub const DEFAULT_INFERENCE_STEPS: u32 = 25;

/// A validated generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Present and non-empty when the request should be recorded and charged.
    pub user_id: Option<String>,
    pub lora_ids: Vec<String>,
    pub num_inference_steps: u32,
}

/// Outcome of a successful generation.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// First image URL, if the provider returned any.
    pub image: Option<String>,
    pub seed: Option<u64>,
    pub model: &'static str,
    /// The stored record when the request carried a user id.
    pub generation: Option<Generation>,
}

#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn ImageProvider>,
    store: Arc<dyn GenerationStore>,
    policy: DebitPolicy,
}

impl Generator {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        store: Arc<dyn GenerationStore>,
        policy: DebitPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            policy,
        }
    }

    #[instrument(
        skip(self, request),
        fields(
            provider = self.provider.name(),
            user_id = request.user_id.as_deref().unwrap_or(""),
            steps = request.num_inference_steps
        )
    )]
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, GenerateError> {
        if self.policy == DebitPolicy::RequireFunds {
            if let Some(user_id) = request.user_id.as_deref() {
                self.ensure_funds(user_id).await?;
            }
        }

        let input = ImageGenerationInput::new(
            request.prompt.clone(),
            request.lora_ids,
            request.num_inference_steps,
        );

        let started = Instant::now();
        let output = match self.provider.generate(&input).await {
            Ok(output) => output,
            Err(e) => {
                counter!(
                    "provider_errors_total",
                    "provider" => self.provider.name(),
                    "kind" => e.kind()
                )
                .increment(1);
                counter!("generations_total", "status" => "failed").increment(1);
                return Err(e.into());
            }
        };
        histogram!("provider_request_duration_seconds", "provider" => self.provider.name())
            .record(started.elapsed().as_secs_f64());

        let image = output.first_image_url().map(str::to_string);
        if image.is_none() {
            warn!(request_id = %output.request_id, "Provider returned no images");
        }

        let generation = match request.user_id {
            Some(user_id) => {
                let new = NewGeneration::completed(
                    user_id,
                    request.prompt,
                    image.clone(),
                    output.request_id.clone(),
                );
                Some(self.record(&new).await?)
            }
            None => None,
        };

        counter!("generations_total", "status" => "completed").increment(1);

        info!(
            request_id = %output.request_id,
            seed = ?output.seed,
            recorded = generation.is_some(),
            "Image generated"
        );

        Ok(GenerationResult {
            image,
            seed: output.seed,
            model: MODEL_LABEL,
            generation,
        })
    }

    async fn ensure_funds(&self, user_id: &str) -> Result<(), GenerateError> {
        match self.store.get_balance(user_id).await? {
            Some(balance) if balance >= GENERATION_CHARGE => Ok(()),
            balance => {
                warn!(balance = ?balance, "Balance cannot cover a generation");
                Err(GenerateError::InsufficientCredits)
            }
        }
    }

    async fn record(&self, new: &NewGeneration) -> Result<Generation, GenerateError> {
        match self.store.record_generation(new, self.policy).await? {
            RecordOutcome::Recorded(generation) => {
                let hundredths = (generation.credits_used * Decimal::ONE_HUNDRED)
                    .to_u64()
                    .unwrap_or_default();
                counter!("credits_debited_hundredths_total").increment(hundredths);
                Ok(generation)
            }
            RecordOutcome::RecordedWithoutDebit(generation) => {
                warn!(
                    user_id = %generation.user_id,
                    "Unknown user, generation recorded without a charge"
                );
                Ok(generation)
            }
            RecordOutcome::AlreadyRecorded(generation) => {
                warn!(
                    fal_request_id = %generation.fal_request_id,
                    "Provider request already recorded, not charging again"
                );
                Ok(generation)
            }
            RecordOutcome::InsufficientCredits { balance } => {
                warn!(balance = %balance, "Balance dropped below the charge before debit");
                Err(GenerateError::InsufficientCredits)
            }
        }
    }
}
