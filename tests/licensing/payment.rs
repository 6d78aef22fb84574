//! Payment intent creation.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_create_prices_by_license_count() {
    let ctx = test_context();

    let reply = ctx
        .licensor()
        .create_payment_intent(&CreatePaymentRequest { license_count: 3 })
        .await
        .unwrap();

    assert_eq!(reply.id, "pi_created_1");
    assert_eq!(reply.client_secret, "pi_created_1_secret_test");

    let created = ctx.payments.created();
    assert_eq!(created.len(), 1);
    let (amount, currency, metadata) = &created[0];
    assert_eq!(*amount, 4500);
    assert_eq!(currency, "usd");
    assert_eq!(metadata["license_count"], "3");
    assert_eq!(metadata["product_id"], PRODUCT_ID);
}

#[tokio::test]
async fn test_create_rejects_out_of_range_counts() {
    let ctx = test_context();
    for license_count in [0, 11, u32::MAX] {
        let err = ctx
            .licensor()
            .create_payment_intent(&CreatePaymentRequest { license_count })
            .await
            .unwrap_err();
        assert_eq!(err, LicenseError::InvalidInput, "{license_count}");
    }
    assert!(ctx.payments.created().is_empty());
}

#[tokio::test]
async fn test_processor_failure_is_invalid_payment() {
    let ctx = test_context();
    ctx.payments.fail_creates();

    let err = ctx
        .licensor()
        .create_payment_intent(&CreatePaymentRequest { license_count: 1 })
        .await
        .unwrap_err();
    assert_eq!(err, LicenseError::PaymentInvalid);
}

/// The metadata written at creation is what finishing reads back.
#[tokio::test]
async fn test_created_intent_finishes_once_paid() {
    let ctx = test_context();
    let reply = ctx
        .licensor()
        .create_payment_intent(&CreatePaymentRequest { license_count: 2 })
        .await
        .unwrap();

    assert_eq!(
        ctx.licensor().finish_purchase(&reply.id).await.unwrap_err(),
        LicenseError::PaymentUnsuccessful
    );

    let (_, _, metadata) = ctx.payments.created().remove(0);
    ctx.payments.add_intent(PaymentIntent {
        id: reply.id.clone(),
        status: "succeeded".into(),
        billing_email: Some("payer@example.com".into()),
        metadata,
    });

    let purchase = ctx.licensor().finish_purchase(&reply.id).await.unwrap();
    assert_eq!(purchase.license_codes.len(), 2);
}
