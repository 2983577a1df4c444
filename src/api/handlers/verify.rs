//! Verification handler

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::server::AppState;
use crate::error::VeilError;
use crate::models::VerificationRequest;

/// Run one verification; workflow failures still answer 200 with
/// `success: false`.
pub async fn run_verification(
    State(state): State<AppState>,
    Json(request): Json<VerificationRequest>,
) -> Result<impl IntoResponse, VeilError> {
    if request.target.trim().is_empty() {
        return Err(VeilError::InvalidRequest("target is required".to_string()));
    }

    let outcome = state.service.run_verification(request).await;
    Ok(Json(outcome))
}
