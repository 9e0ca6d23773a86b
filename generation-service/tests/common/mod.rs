//! Test helper module for generation-service integration tests.
//!
//! Spawns the real HTTP stack on a random port, backed by the in-memory store
//! and a mock provider unless a test supplies its own.

#![allow(dead_code)]

use generation_service::services::providers::mock::MockImageProvider;
use generation_service::services::providers::{GeneratedImage, ProviderOutput};
use generation_service::services::{DebitPolicy, InMemoryGenerationStore};
use generation_service::startup::{AppState, Application};
use rust_decimal::Decimal;
use service_core::observability::init_metrics;
use std::str::FromStr;
use std::sync::Arc;

pub const TEST_USER_ID: &str = "u1";

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

/// Provider output with one image, a seed and a fixed request id.
pub fn provider_output(url: &str, seed: u64, request_id: &str) -> ProviderOutput {
    ProviderOutput {
        images: vec![GeneratedImage {
            url: url.to_string(),
            width: None,
            height: None,
            content_type: None,
        }],
        seed: Some(seed),
        request_id: request_id.to_string(),
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub provider: Arc<MockImageProvider>,
    pub store: Arc<InMemoryGenerationStore>,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn with a mock provider that mints a fresh request id per call and
    /// a store holding `u1` with 10 credits.
    pub async fn spawn() -> Self {
        Self::spawn_with(
            MockImageProvider::new(),
            InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("10.00")),
            DebitPolicy::AllowNegative,
        )
        .await
    }

    pub async fn spawn_with(
        provider: MockImageProvider,
        store: InMemoryGenerationStore,
        policy: DebitPolicy,
    ) -> Self {
        init_metrics();

        let provider = Arc::new(provider);
        let store = Arc::new(store);
        let state = AppState::new(provider.clone(), store.clone(), policy);

        let app = Application::build_with(0, state)
            .await
            .expect("Failed to build test application");
        let port = app.http_port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            provider,
            store,
            client,
        }
    }

    pub async fn post_generate(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/generate", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}
