use axum::extract::State;

use crate::extractors::Json;
use crate::licensing::{LicenseReply, LicenseRequest, ReminderReply, ReminderRequest, Reply};
use crate::state::AppState;

pub async fn lookup_license(
    State(state): State<AppState>,
    Json(request): Json<LicenseRequest>,
) -> Json<Reply<LicenseReply>> {
    let result = state
        .licensor
        .lookup_license(&request)
        .map(|license| LicenseReply { license });
    Json(result.into())
}

/// Always answers with an empty body so callers can't probe which emails
/// have licenses.
pub async fn email_license_codes(
    State(state): State<AppState>,
    Json(request): Json<ReminderRequest>,
) -> Json<Reply<ReminderReply>> {
    Json(Reply::ok(state.licensor.send_reminder(&request).await))
}
