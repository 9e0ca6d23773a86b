//! Application startup and lifecycle management.

use crate::config::{GenerationConfig, ProviderSettings, StoreSettings};
use crate::handlers::{generate, health};
use crate::services::providers::fal::FalImageProvider;
use crate::services::providers::mock::MockImageProvider;
use crate::services::{
    DebitPolicy, GenerationStore, Generator, ImageProvider, InMemoryGenerationStore,
    PgGenerationStore,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use service_core::observability::init_metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub generator: Generator,
    pub store: Arc<dyn GenerationStore>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        store: Arc<dyn GenerationStore>,
        policy: DebitPolicy,
    ) -> Self {
        Self {
            generator: Generator::new(provider, store.clone(), policy),
            store,
        }
    }
}

/// HTTP surface: probes, metrics and the generation endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/api/generate", post(generate::generate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: GenerationConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn GenerationStore> = match config.store {
            StoreSettings::Postgres(db_config) => {
                let db = PgGenerationStore::new(
                    db_config.url.expose_secret(),
                    db_config.max_connections,
                    db_config.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                if db_config.run_migrations {
                    db.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        e
                    })?;
                }

                Arc::new(db)
            }
            StoreSettings::Memory => {
                tracing::warn!("Using in-memory store; balances are lost on restart");
                Arc::new(InMemoryGenerationStore::new())
            }
        };

        let provider: Arc<dyn ImageProvider> = match config.provider {
            ProviderSettings::Fal(fal_config) => {
                let provider = FalImageProvider::new(fal_config)
                    .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
                tracing::info!(model = %provider.model(), "fal provider configured");
                Arc::new(provider)
            }
            ProviderSettings::Mock => {
                tracing::warn!("Using mock image provider");
                Arc::new(MockImageProvider::new())
            }
        };

        let policy = if config.require_credits {
            DebitPolicy::RequireFunds
        } else {
            DebitPolicy::AllowNegative
        };

        Self::build_with(config.common.port, AppState::new(provider, store, policy)).await
    }

    /// Bind a listener for an already assembled state. Port 0 picks a free port.
    pub async fn build_with(port: u16, state: AppState) -> Result<Self, AppError> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Generation service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "generation-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
