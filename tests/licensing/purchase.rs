//! Purchase finalization: exactly one set of codes and one receipt per payment.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Barrier;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const BUYER: &str = "buyer@example.com";

#[tokio::test]
async fn test_finish_creates_requested_codes_and_sends_receipt() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_1", "Buyer@Example.com", 3));

    let reply = ctx.licensor().finish_purchase("pi_1").await.unwrap();

    assert_eq!(reply.email.as_str(), BUYER);
    assert_eq!(reply.license_codes.len(), 3);
    let mut sorted = reply.license_codes.clone();
    sorted.sort();
    assert_eq!(reply.license_codes, sorted, "codes are returned sorted");

    let doc = ctx.licenses_for(BUYER).unwrap();
    assert_eq!(doc.email.as_str(), BUYER);
    for code in &reply.license_codes {
        let license = &doc.licenses[code];
        assert_eq!(license.payment_id, "pi_1");
        assert_eq!(license.created_at, START);
        assert!(license.machines.is_empty());
    }

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, BUYER);
    assert_eq!(sent[0].from, "licenses@widget.example");
    assert_eq!(sent[0].subject, "Your Widget purchase");
    for code in &reply.license_codes {
        assert!(sent[0].text.contains(code.as_str()), "receipt lists {code}");
    }
}

#[tokio::test]
async fn test_finish_twice_returns_same_codes_and_one_receipt() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_1", BUYER, 2));

    let first = ctx.licensor().finish_purchase("pi_1").await.unwrap();
    ctx.clock.advance(120);
    let second = ctx.licensor().finish_purchase("pi_1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ctx.mailer.count(), 1, "only the creating call sends a receipt");
    assert_eq!(ctx.licenses_for(BUYER).unwrap().licenses.len(), 2);
}

#[tokio::test]
async fn test_second_payment_adds_to_existing_licenses() {
    let ctx = test_context();
    ctx.payments.add_intent(paid_intent("pi_1", BUYER, 2));
    ctx.payments.add_intent(paid_intent("pi_2", BUYER, 3));

    let first = ctx.licensor().finish_purchase("pi_1").await.unwrap();
    let second = ctx.licensor().finish_purchase("pi_2").await.unwrap();

    let first_codes: HashSet<_> = first.license_codes.iter().collect();
    assert!(
        second.license_codes.iter().all(|c| !first_codes.contains(c)),
        "new codes never collide with existing ones"
    );

    let doc = ctx.licenses_for(BUYER).unwrap();
    assert_eq!(doc.licenses.len(), 5);
    assert_eq!(doc.codes_for_payment("pi_1"), first.license_codes);
    assert_eq!(doc.codes_for_payment("pi_2"), second.license_codes);
    assert_eq!(ctx.mailer.count(), 2);
}

#[tokio::test]
async fn test_unsettled_payment_is_unsuccessful() {
    let ctx = test_context();
    let mut intent = paid_intent("pi_1", BUYER, 1);
    intent.status = "requires_payment_method".to_string();
    ctx.payments.add_intent(intent);

    let err = ctx.licensor().finish_purchase("pi_1").await.unwrap_err();
    assert_eq!(err, LicenseError::PaymentUnsuccessful);
    assert_eq!(err.message(), "payment unsuccessful");
    assert!(ctx.licenses_for(BUYER).is_none());
    assert_eq!(ctx.mailer.count(), 0);
}

#[tokio::test]
async fn test_unknown_payment_is_invalid() {
    let ctx = test_context();
    let err = ctx.licensor().finish_purchase("pi_missing").await.unwrap_err();
    assert_eq!(err, LicenseError::PaymentInvalid);
    assert_eq!(err.message(), "invalid payment");

    assert_eq!(
        ctx.licensor().finish_purchase("   ").await.unwrap_err(),
        LicenseError::PaymentInvalid
    );
}

#[tokio::test]
async fn test_payment_with_bad_metadata_is_invalid() {
    let ctx = test_context();

    let mut no_email = paid_intent("pi_no_email", BUYER, 1);
    no_email.billing_email = None;
    let mut too_many = paid_intent("pi_too_many", BUYER, 1);
    too_many.metadata.insert("license_count".into(), "11".into());
    let mut other_product = paid_intent("pi_other", BUYER, 1);
    other_product.metadata.insert("product_id".into(), "gadget".into());

    for intent in [no_email, too_many, other_product] {
        let id = intent.id.clone();
        ctx.payments.add_intent(intent);
        assert_eq!(
            ctx.licensor().finish_purchase(&id).await.unwrap_err(),
            LicenseError::PaymentInvalid,
            "{id}"
        );
    }
    assert!(ctx.licenses_for(BUYER).is_none());
}

#[tokio::test]
async fn test_receipt_failure_does_not_fail_purchase() {
    let ctx = test_context();
    ctx.mailer.fail_sends();
    ctx.payments.add_intent(paid_intent("pi_1", BUYER, 1));

    let reply = ctx.licensor().finish_purchase("pi_1").await.unwrap();
    assert_eq!(reply.license_codes.len(), 1);
    assert_eq!(ctx.mailer.count(), 1, "send was attempted");
    assert_eq!(ctx.licenses_for(BUYER).unwrap().licenses.len(), 1);

    // A retry finds the committed licenses and doesn't try again.
    let again = ctx.licensor().finish_purchase("pi_1").await.unwrap();
    assert_eq!(again, reply);
    assert_eq!(ctx.mailer.count(), 1);
}

/// The client's finish call and webhook deliveries can all land at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_finish_creates_codes_once() {
    let ctx = Arc::new(test_context());
    ctx.payments.add_intent(paid_intent("pi_race", BUYER, 2));

    let tasks = 8;
    let barrier = Arc::new(Barrier::new(tasks));
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                ctx.licensor().finish_purchase("pi_race").await
            })
        })
        .collect();

    let mut replies = Vec::new();
    for handle in handles {
        replies.push(handle.await.unwrap().expect("every finish call should succeed"));
    }

    assert!(replies.windows(2).all(|w| w[0] == w[1]), "all callers see the same codes");
    assert_eq!(ctx.licenses_for(BUYER).unwrap().licenses.len(), 2);
    assert_eq!(ctx.mailer.count(), 1, "exactly one receipt");
}
