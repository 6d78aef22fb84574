use axum::extract::State;

use crate::extractors::Json;
use crate::licensing::{
    CreatePaymentRequest, FinishPurchaseRequest, PaymentReply, PurchaseReply, Reply,
};
use crate::state::AppState;

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Json<Reply<PaymentReply>> {
    Json(state.licensor.create_payment_intent(&request).await.into())
}

/// Called by the client once the payment form reports success. The webhook
/// may race this; both end up with the same codes.
pub async fn finish_purchase(
    State(state): State<AppState>,
    Json(request): Json<FinishPurchaseRequest>,
) -> Json<Reply<PurchaseReply>> {
    Json(
        state
            .licensor
            .finish_purchase(&request.payment_intent_id)
            .await
            .into(),
    )
}
