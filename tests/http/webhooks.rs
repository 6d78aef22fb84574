//! Stripe webhook: verify, filter, acknowledge, then finish in the background.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tokio::sync::Barrier;
use tower::ServiceExt;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const BUYER: &str = "buyer@example.com";

fn succeeded_event(payment_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_test_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": payment_id, "object": "payment_intent", "status": "succeeded" } }
    }))
    .unwrap()
}

async fn deliver(state: AppState, body: Vec<u8>, signature: Option<&str>) -> (StatusCode, String) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/purchase/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("stripe-signature", signature);
    }

    let response = webhook_app(state)
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_succeeded_event_finishes_purchase_in_background() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_hook", BUYER, 2));

    let body = succeeded_event("pi_hook");
    let signature = stripe_signature_header(&body);
    let (status, text) = deliver(ctx.state.clone(), body, Some(&signature)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Event received");

    eventually(|| ctx.mailer.count() == 1).await;
    let doc = ctx.licenses_for(BUYER).unwrap();
    assert_eq!(doc.codes_for_payment("pi_hook").len(), 2);
}

#[tokio::test]
async fn test_webhook_and_client_agree_on_codes() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_hook", BUYER, 1));

    let body = succeeded_event("pi_hook");
    let signature = stripe_signature_header(&body);
    deliver(ctx.state.clone(), body, Some(&signature)).await;
    eventually(|| ctx.mailer.count() == 1).await;

    let reply = ctx.licensor().finish_purchase("pi_hook").await.unwrap();
    assert_eq!(reply.license_codes, ctx.licenses_for(BUYER).unwrap().codes());
    assert_eq!(ctx.mailer.count(), 1, "client call after webhook sends nothing");
}

#[tokio::test]
async fn test_missing_signature_is_bad_request() {
    let ctx = test_context();
    let (status, _) = deliver(ctx.state.clone(), succeeded_event("pi_1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_signature_is_unauthorized() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_1", BUYER, 1));
    let body = succeeded_event("pi_1");
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(&body, "whsec_wrong", &timestamp);

    let (status, text) = deliver(
        ctx.state.clone(),
        body,
        Some(&format!("t={},v1={}", timestamp, signature)),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(text, "Invalid signature");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(ctx.licenses_for(BUYER).is_none(), "unverified events change nothing");
}

#[tokio::test]
async fn test_tampered_body_is_unauthorized() {
    let ctx = test_context();
    let signature = stripe_signature_header(&succeeded_event("pi_1"));
    let (status, _) = deliver(ctx.state.clone(), succeeded_event("pi_2"), Some(&signature)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stale_timestamp_is_unauthorized() {
    let ctx = test_context();
    let body = succeeded_event("pi_1");
    let timestamp = (chrono::Utc::now().timestamp() - 301).to_string();
    let signature = compute_stripe_signature(&body, WEBHOOK_SECRET, &timestamp);

    let (status, _) = deliver(
        ctx.state.clone(),
        body,
        Some(&format!("t={},v1={}", timestamp, signature)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_signature_header_is_bad_request() {
    let ctx = test_context();
    let (status, _) = deliver(ctx.state.clone(), succeeded_event("pi_1"), Some("garbage")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_event_types_are_ignored() {
    let ctx = test_context();
    let body = serde_json::to_vec(&json!({
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_1" } }
    }))
    .unwrap();
    let signature = stripe_signature_header(&body);

    let (status, text) = deliver(ctx.state.clone(), body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Event ignored");
}

#[tokio::test]
async fn test_signed_garbage_is_bad_request() {
    let ctx = test_context();

    let body = b"{not json".to_vec();
    let signature = stripe_signature_header(&body);
    let (status, _) = deliver(ctx.state.clone(), body, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = serde_json::to_vec(&json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "status": "succeeded" } }
    }))
    .unwrap();
    let signature = stripe_signature_header(&body);
    let (status, _) = deliver(ctx.state.clone(), body, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_processing() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_big", BUYER, 1));

    let mut at_limit = succeeded_event("pi_big");
    at_limit.resize(handlers::webhooks::MAX_WEBHOOK_BODY_BYTES, b' ');
    let signature = stripe_signature_header(&at_limit);
    let (status, text) = deliver(ctx.state.clone(), at_limit, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Event received");
    eventually(|| ctx.mailer.count() == 1).await;

    ctx.payments.add_intent(paid_intent("pi_huge", "other@example.com", 1));
    let mut oversized = succeeded_event("pi_huge");
    oversized.resize(handlers::webhooks::MAX_WEBHOOK_BODY_BYTES + 1, b' ');
    let signature = stripe_signature_header(&oversized);
    let (status, _) = deliver(ctx.state.clone(), oversized, Some(&signature)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(ctx.licenses_for("other@example.com").is_none());
    assert_eq!(ctx.mailer.count(), 1);
}

/// Acknowledged failures stay log-only.
#[tokio::test]
async fn test_unknown_payment_is_still_acknowledged() {
    let ctx = test_context();
    let body = succeeded_event("pi_unknown");
    let signature = stripe_signature_header(&body);

    let (status, _) = deliver(ctx.state.clone(), body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(ctx.mailer.count(), 0);
}

/// Redeliveries racing each other create one set of codes and one receipt.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeliveries_create_one_purchase() {
    let ctx = Arc::new(test_context());
    ctx.payments.add_intent(paid_intent("pi_redeliver", BUYER, 3));

    let body = Arc::new(succeeded_event("pi_redeliver"));
    let signature = Arc::new(stripe_signature_header(&body));

    let tasks = 5;
    let barrier = Arc::new(Barrier::new(tasks));
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            let body = body.clone();
            let signature = signature.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                deliver(ctx.state.clone(), body.as_ref().clone(), Some(signature.as_str())).await
            })
        })
        .collect();

    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    eventually(|| ctx.mailer.count() >= 1).await;
    // Give stragglers a chance to (wrongly) send a second receipt.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(ctx.mailer.count(), 1);
    assert_eq!(ctx.licenses_for(BUYER).unwrap().licenses.len(), 3);
}
