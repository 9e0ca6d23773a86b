//! End-to-end tests for `POST /api/generate`.

mod common;

use common::{dec, provider_output, TestApp, TEST_USER_ID};
use generation_service::services::providers::mock::MockImageProvider;
use generation_service::services::providers::ProviderOutput;
use generation_service::services::{DebitPolicy, InMemoryGenerationStore};
use serde_json::json;

#[tokio::test]
async fn red_fox_scenario_records_and_debits_once() {
    let app = TestApp::spawn_with(
        MockImageProvider::returning(provider_output("https://fal.media/x.png", 42, "req_1")),
        InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("10.00")),
        DebitPolicy::AllowNegative,
    )
    .await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "image": "https://fal.media/x.png",
            "seed": 42,
            "model": "z-image-turbo-6b"
        })
    );

    let generations = app.store.generations();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].user_id, "u1");
    assert_eq!(generations[0].prompt, "a red fox");
    assert_eq!(generations[0].image_url.as_deref(), Some("https://fal.media/x.png"));
    assert_eq!(generations[0].fal_request_id, "req_1");
    assert_eq!(generations[0].credits_used, dec("0.25"));
    assert_eq!(generations[0].status, "completed");
    assert_eq!(app.store.balance("u1"), Some(dec("9.75")));
}

#[tokio::test]
async fn missing_prompt_is_rejected_without_side_effects() {
    let app = TestApp::spawn().await;

    for body in [json!({}), json!({ "prompt": "" }), json!({ "prompt": null, "userId": "u1" })] {
        let response = app.post_generate(body).await;

        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Prompt is required" }));
    }

    assert_eq!(app.provider.call_count(), 0);
    assert_eq!(app.store.write_attempts(), 0);
}

#[tokio::test]
async fn whitespace_prompt_is_forwarded_to_the_provider() {
    let app = TestApp::spawn().await;

    let response = app.post_generate(json!({ "prompt": "   " })).await;

    assert_eq!(response.status().as_u16(), 200);
    let calls = app.provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "   ");
}

#[tokio::test]
async fn invalid_json_is_a_client_error() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/api/generate", app.address))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn zero_inference_steps_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "numInferenceSteps": 0 }))
        .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "numInferenceSteps must be at least 1");
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn anonymous_request_is_not_persisted() {
    let app = TestApp::spawn().await;

    let response = app.post_generate(json!({ "prompt": "a red fox" })).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["image"].is_string());
    assert_eq!(body["seed"], 42);
    assert_eq!(body["model"], "z-image-turbo-6b");

    assert_eq!(app.store.write_attempts(), 0);
    assert_eq!(app.store.balance(TEST_USER_ID), Some(dec("10.00")));
}

#[tokio::test]
async fn provider_receives_caller_controlled_fields_only() {
    let app = TestApp::spawn().await;

    app.post_generate(json!({
        "prompt": "a red fox",
        "loraIds": ["watercolor", "film-grain"],
        "numInferenceSteps": 8
    }))
    .await;
    app.post_generate(json!({ "prompt": "a blue fox", "loraIds": [] }))
        .await;

    let calls = app.provider.calls();
    assert_eq!(calls.len(), 2);

    assert_eq!(calls[0].prompt, "a red fox");
    assert_eq!(
        calls[0].loras,
        Some(vec!["watercolor".to_string(), "film-grain".to_string()])
    );
    assert_eq!(calls[0].num_inference_steps, 8);
    assert_eq!(calls[0].image_size, "landscape_16_9");
    assert_eq!(calls[0].guidance_scale, 7.5);

    assert_eq!(calls[1].loras, None);
    assert_eq!(calls[1].num_inference_steps, 25);
    let payload = serde_json::to_value(&calls[1]).unwrap();
    assert!(payload.get("loras").is_none());
}

#[tokio::test]
async fn provider_failure_returns_500_and_writes_nothing() {
    let app = TestApp::spawn_with(
        MockImageProvider::failing("model overloaded"),
        InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("10.00")),
        DebitPolicy::AllowNegative,
    )
    .await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
        .await;

    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Image generation failed");
    assert!(body["message"].as_str().unwrap().contains("model overloaded"));

    assert_eq!(app.store.write_attempts(), 0);
    assert_eq!(app.store.balance("u1"), Some(dec("10.00")));
}

#[tokio::test]
async fn persistence_failure_returns_500() {
    let store = InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("10.00"));
    store.fail_writes();
    let app = TestApp::spawn_with(MockImageProvider::new(), store, DebitPolicy::AllowNegative).await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
        .await;

    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Image generation failed");
    assert!(app.store.generations().is_empty());
    assert_eq!(app.store.balance("u1"), Some(dec("10.00")));
}

#[tokio::test]
async fn unknown_user_is_served_and_recorded_without_a_charge() {
    let app = TestApp::spawn().await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "ghost" }))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let generations = app.store.generations();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].user_id, "ghost");
    assert_eq!(app.store.balance("ghost"), None);
    assert_eq!(app.store.balance(TEST_USER_ID), Some(dec("10.00")));
}

#[tokio::test]
async fn replayed_provider_request_is_charged_once() {
    let app = TestApp::spawn_with(
        MockImageProvider::returning(provider_output("https://fal.media/x.png", 42, "req_1")),
        InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("10.00")),
        DebitPolicy::AllowNegative,
    )
    .await;

    for _ in 0..2 {
        let response = app
            .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }

    assert_eq!(app.store.generations().len(), 1);
    assert_eq!(app.store.balance("u1"), Some(dec("9.75")));
}

#[tokio::test]
async fn missing_image_and_seed_serialize_as_null() {
    let app = TestApp::spawn_with(
        MockImageProvider::returning(ProviderOutput {
            images: Vec::new(),
            seed: None,
            request_id: "req_empty".to_string(),
        }),
        InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("10.00")),
        DebitPolicy::AllowNegative,
    )
    .await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["image"], serde_json::Value::Null);
    assert_eq!(body["seed"], serde_json::Value::Null);

    let generations = app.store.generations();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].image_url, None);
}

#[tokio::test]
async fn balance_may_go_negative_without_the_guard() {
    let app = TestApp::spawn_with(
        MockImageProvider::new(),
        InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("0.10")),
        DebitPolicy::AllowNegative,
    )
    .await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.store.balance("u1"), Some(dec("-0.15")));
}

#[tokio::test]
async fn guard_rejects_users_who_cannot_pay() {
    let app = TestApp::spawn_with(
        MockImageProvider::new(),
        InMemoryGenerationStore::new().with_user(TEST_USER_ID, dec("0.10")),
        DebitPolicy::RequireFunds,
    )
    .await;

    let response = app
        .post_generate(json!({ "prompt": "a red fox", "userId": "u1" }))
        .await;

    assert_eq!(response.status().as_u16(), 402);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Insufficient credits" }));
    assert_eq!(app.provider.call_count(), 0);
    assert_eq!(app.store.balance("u1"), Some(dec("0.10")));
}

#[tokio::test]
async fn responses_allow_cross_origin_callers() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/api/generate", app.address))
        .header("origin", "http://localhost:3000")
        .json(&json!({ "prompt": "a red fox" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
