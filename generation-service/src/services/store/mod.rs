//! Persistence for generation records and user balances.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryGenerationStore;
pub use postgres::PgGenerationStore;

use crate::models::{Generation, NewGeneration};
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;

/// Whether a debit may take a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitPolicy {
    AllowNegative,
    RequireFunds,
}

/// Result of recording a generation.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// Row inserted and balance debited in one transaction.
    Recorded(Generation),
    /// Row inserted, but no `users` row matched the id so nothing was debited.
    RecordedWithoutDebit(Generation),
    /// The provider request id was already recorded; nothing was written.
    AlreadyRecorded(Generation),
    /// `RequireFunds` and the balance could not cover the charge, or the user
    /// is unknown; nothing was written.
    InsufficientCredits { balance: Decimal },
}

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Insert the generation and debit its charge from the user atomically.
    ///
    /// Idempotent on `fal_request_id`: a replay returns the existing record
    /// and does not debit again. Under `AllowNegative` an unknown user still
    /// gets the record; under `RequireFunds` nothing is written.
    async fn record_generation(
        &self,
        generation: &NewGeneration,
        policy: DebitPolicy,
    ) -> Result<RecordOutcome, AppError>;

    /// Current balance, or `None` for an unknown user.
    async fn get_balance(&self, user_id: &str) -> Result<Option<Decimal>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
