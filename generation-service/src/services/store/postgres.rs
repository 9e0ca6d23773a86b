//! PostgreSQL store for generation-service.

use super::{DebitPolicy, GenerationStore, RecordOutcome};
use crate::models::{Generation, NewGeneration, UserBalance};
use async_trait::async_trait;
use metrics::histogram;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Read back as portable types: deployments differ in how `user_id` and
/// `credits_used` are declared.
const GENERATION_COLUMNS: &str = "user_id::text AS user_id, prompt::text AS prompt, \
     image_url::text AS image_url, fal_request_id::text AS fal_request_id, \
     credits_used::numeric AS credits_used, status::text AS status";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgGenerationStore {
    pool: PgPool,
}

impl PgGenerationStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "generation-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema (`users`, `generations`).
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Look up a generation by the provider's request id.
    #[instrument(skip(self))]
    pub async fn find_by_request_id(
        &self,
        fal_request_id: &str,
    ) -> Result<Option<Generation>, AppError> {
        let started = Instant::now();
        let generation = sqlx::query_as::<_, Generation>(&format!(
            "SELECT {} FROM generations WHERE fal_request_id = $1",
            GENERATION_COLUMNS
        ))
        .bind(fal_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get generation: {}", e)))?;

        observe("find_by_request_id", started);
        Ok(generation)
    }

    /// Resolve a unique-violation race: another request recorded this
    /// provider request id first.
    async fn existing_after_conflict(&self, fal_request_id: &str) -> Result<RecordOutcome, AppError> {
        match self.find_by_request_id(fal_request_id).await? {
            Some(existing) => Ok(RecordOutcome::AlreadyRecorded(existing)),
            None => Err(AppError::Conflict(anyhow::anyhow!(
                "Duplicate provider request id {}",
                fal_request_id
            ))),
        }
    }
}

#[async_trait]
impl GenerationStore for PgGenerationStore {
    #[instrument(
        skip(self, generation),
        fields(user_id = %generation.user_id, fal_request_id = %generation.fal_request_id)
    )]
    async fn record_generation(
        &self,
        generation: &NewGeneration,
        policy: DebitPolicy,
    ) -> Result<RecordOutcome, AppError> {
        let started = Instant::now();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_as::<_, Generation>(&format!(
            "SELECT {} FROM generations WHERE fal_request_id = $1",
            GENERATION_COLUMNS
        ))
        .bind(&generation.fal_request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check idempotency: {}", e))
        })?;

        if let Some(existing) = existing {
            tx.rollback().await.ok();
            observe("record_generation", started);
            return Ok(RecordOutcome::AlreadyRecorded(existing));
        }

        // json_populate_record casts every field to the column's own type, so
        // the insert works whether ids are TEXT or UUID.
        let row = serde_json::json!({
            "user_id": generation.user_id,
            "prompt": generation.prompt,
            "image_url": generation.image_url,
            "fal_request_id": generation.fal_request_id,
            "credits_used": generation.credits_used.to_string(),
            "status": generation.status.as_str(),
        });

        let inserted = sqlx::query_as::<_, Generation>(&format!(
            r#"
            INSERT INTO generations (user_id, prompt, image_url, fal_request_id, credits_used, status)
            SELECT user_id, prompt, image_url, fal_request_id, credits_used, status
            FROM json_populate_record(NULL::generations, $1::json)
            RETURNING {}
            "#,
            GENERATION_COLUMNS
        ))
        .bind(row)
        .fetch_one(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                warn!("Concurrent request recorded this generation first");
                observe("record_generation", started);
                return self
                    .existing_after_conflict(&generation.fal_request_id)
                    .await;
            }
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                tx.rollback().await.ok();
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "User {} not found",
                    generation.user_id
                )));
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert generation: {}",
                    e
                )));
            }
        };

        let debit_sql = match policy {
            DebitPolicy::AllowNegative => {
                "UPDATE users SET credits = credits - $1 WHERE id::text = $2 \
                 RETURNING credits::numeric"
            }
            DebitPolicy::RequireFunds => {
                "UPDATE users SET credits = credits - $1 WHERE id::text = $2 AND credits >= $1 \
                 RETURNING credits::numeric"
            }
        };

        let balance = sqlx::query_scalar::<_, Decimal>(debit_sql)
            .bind(generation.credits_used)
            .bind(&generation.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to debit credits: {}", e)))?;

        let outcome = match (balance, policy) {
            (Some(balance), _) => {
                info!(
                    credits_used = %inserted.credits_used,
                    balance = %balance,
                    "Generation recorded"
                );
                RecordOutcome::Recorded(inserted)
            }
            (None, DebitPolicy::AllowNegative) => {
                warn!("No user row matched; generation recorded without a debit");
                RecordOutcome::RecordedWithoutDebit(inserted)
            }
            (None, DebitPolicy::RequireFunds) => {
                tx.rollback().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to roll back: {}", e))
                })?;
                observe("record_generation", started);

                let balance = self
                    .get_balance(&generation.user_id)
                    .await?
                    .unwrap_or(Decimal::ZERO);
                return Ok(RecordOutcome::InsufficientCredits { balance });
            }
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        observe("record_generation", started);
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, user_id: &str) -> Result<Option<Decimal>, AppError> {
        let started = Instant::now();
        let user = sqlx::query_as::<_, UserBalance>(
            "SELECT id::text AS id, credits::numeric AS credits FROM users WHERE id::text = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get balance: {}", e)))?;

        observe("get_balance", started);
        Ok(user.map(|u| u.credits))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

fn observe(operation: &'static str, started: Instant) {
    histogram!("db_query_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
