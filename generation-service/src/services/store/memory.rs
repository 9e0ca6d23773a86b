//! In-process store for local runs and tests.
//!
//! Holds the same invariants as the PostgreSQL store: the row and the debit
//! land together or not at all, a provider request id is recorded once, and
//! an unknown user is recorded without a debit unless funds are required.

use super::{DebitPolicy, GenerationStore, RecordOutcome};
use crate::models::{Generation, NewGeneration};
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    balances: HashMap<String, Decimal>,
    generations: Vec<Generation>,
    write_attempts: usize,
    fail_writes: bool,
    unhealthy: bool,
}

#[derive(Default)]
pub struct InMemoryGenerationStore {
    state: Mutex<State>,
}

impl InMemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user with a starting balance.
    pub fn with_user(self, user_id: impl Into<String>, credits: Decimal) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.balances.insert(user_id.into(), credits);
        }
        self
    }

    pub fn balance(&self, user_id: &str) -> Option<Decimal> {
        self.lock().ok()?.balances.get(user_id).copied()
    }

    /// Recorded generations, oldest first.
    pub fn generations(&self) -> Vec<Generation> {
        self.lock()
            .map(|state| state.generations.clone())
            .unwrap_or_default()
    }

    /// Number of `record_generation` calls, including failed ones.
    pub fn write_attempts(&self) -> usize {
        self.lock().map(|state| state.write_attempts).unwrap_or_default()
    }

    /// Make every subsequent write fail with a database error.
    pub fn fail_writes(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_writes = true;
        }
    }

    /// Make health checks fail.
    pub fn set_unhealthy(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.unhealthy = true;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("Store lock poisoned")))
    }
}

#[async_trait]
impl GenerationStore for InMemoryGenerationStore {
    async fn record_generation(
        &self,
        generation: &NewGeneration,
        policy: DebitPolicy,
    ) -> Result<RecordOutcome, AppError> {
        let mut state = self.lock()?;
        state.write_attempts += 1;

        if state.fail_writes {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to insert generation: store unavailable"
            )));
        }

        if let Some(existing) = state
            .generations
            .iter()
            .find(|g| g.fal_request_id == generation.fal_request_id)
        {
            return Ok(RecordOutcome::AlreadyRecorded(existing.clone()));
        }

        let balance = state.balances.get(&generation.user_id).copied();

        if policy == DebitPolicy::RequireFunds {
            match balance {
                Some(balance) if balance >= generation.credits_used => {}
                other => {
                    return Ok(RecordOutcome::InsufficientCredits {
                        balance: other.unwrap_or(Decimal::ZERO),
                    })
                }
            }
        }

        let record = Generation {
            user_id: generation.user_id.clone(),
            prompt: generation.prompt.clone(),
            image_url: generation.image_url.clone(),
            fal_request_id: generation.fal_request_id.clone(),
            credits_used: generation.credits_used,
            status: generation.status.as_str().to_string(),
        };
        state.generations.push(record.clone());

        match balance {
            Some(balance) => {
                state
                    .balances
                    .insert(generation.user_id.clone(), balance - generation.credits_used);
                Ok(RecordOutcome::Recorded(record))
            }
            None => Ok(RecordOutcome::RecordedWithoutDebit(record)),
        }
    }

    async fn get_balance(&self, user_id: &str) -> Result<Option<Decimal>, AppError> {
        Ok(self.lock()?.balances.get(user_id).copied())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.lock()?.unhealthy {
            return Err(AppError::ServiceUnavailable);
        }
        Ok(())
    }
}
