//! Generation record model: the audit row for one completed image request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Credits charged per generation, independent of step count or adapters.
pub const GENERATION_CHARGE: Decimal = Decimal::from_parts(25, 0, 0, false, 2);

/// Model label reported to clients.
pub const MODEL_LABEL: &str = "z-image-turbo-6b";

/// Generation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Completed,
    Failed,
}

impl GenerationStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted generation record.
///
/// Only the columns every deployment's `generations` table carries; surrogate
/// keys and timestamps are left to the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Generation {
    pub user_id: String,
    pub prompt: String,
    pub image_url: Option<String>,
    pub fal_request_id: String,
    pub credits_used: Decimal,
    pub status: String,
}

/// Input for recording a completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGeneration {
    pub user_id: String,
    pub prompt: String,
    pub image_url: Option<String>,
    pub fal_request_id: String,
    pub credits_used: Decimal,
    pub status: GenerationStatus,
}

impl NewGeneration {
    /// A completed generation at the standard charge.
    pub fn completed(
        user_id: impl Into<String>,
        prompt: impl Into<String>,
        image_url: Option<String>,
        fal_request_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            prompt: prompt.into(),
            image_url,
            fal_request_id: fal_request_id.into(),
            credits_used: GENERATION_CHARGE,
            status: GenerationStatus::Completed,
        }
    }
}
