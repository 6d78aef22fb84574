use axum::extract::State;

use crate::extractors::Json;
use crate::licensing::{LicenseReply, Reply, TrialRequest};
use crate::state::AppState;

pub async fn lookup_trial(
    State(state): State<AppState>,
    Json(request): Json<TrialRequest>,
) -> Json<Reply<LicenseReply>> {
    let result = state
        .licensor
        .lookup_trial(&request)
        .map(|license| LicenseReply { license });
    Json(result.into())
}
