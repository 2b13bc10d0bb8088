//! Handlers for license seats.
//!
//! Every mutating endpoint resolves the caller from the bearer token and
//! hands the transition to the coordinator. Ownership rules live there, so
//! the handlers stay thin.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use seatpool_core::error::CoreError;
use seatpool_core::otp::otp_key;
use seatpool_core::types::DbId;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// Result of an expiry sweep.
#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub expired_count: usize,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/licenses
///
/// Every seat with its state, holder and credentials.
pub async fn list_licenses(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let licenses = state.coordinator.list().await?;
    Ok(Json(DataResponse { data: licenses }))
}

/// GET /api/v1/licenses/{id}
///
/// A held seat is visible only to its holder and to admins.
pub async fn get_license(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.get(id, user.caller()).await?;
    Ok(Json(DataResponse { data: license }))
}

/// GET /api/v1/licenses/{id}/otp
///
/// Latest one-time code for the seat's shared account.
pub async fn get_otp(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.authorize_otp(id, user.caller()).await?;
    let key = otp_key(&license.no)?;

    let source = state
        .otp_source
        .as_ref()
        .ok_or(CoreError::NotFound { entity: "OTP", id })?;

    let code = source
        .lookup(&key)
        .await?
        .ok_or(CoreError::NotFound { entity: "OTP", id })?;

    tracing::info!(license_id = id, user_id = user.caller().user_id, "OTP retrieved");
    Ok(Json(DataResponse { data: code }))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// POST /api/v1/licenses/{id}/request
pub async fn request_license(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.request(id, user.caller()).await?;
    Ok(Json(DataResponse { data: license }))
}

/// POST /api/v1/licenses/{id}/activate
pub async fn activate_license(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.activate(id, user.caller()).await?;
    Ok(Json(DataResponse { data: license }))
}

/// POST /api/v1/licenses/{id}/extend
///
/// Accepted only inside the extend window before expiry.
pub async fn extend_license(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.extend(id, user.caller()).await?;
    Ok(Json(DataResponse { data: license }))
}

/// POST /api/v1/licenses/{id}/cancel-reservation
pub async fn cancel_reservation(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.cancel_reservation(id, user.caller()).await?;
    Ok(Json(DataResponse { data: license }))
}

/// POST /api/v1/licenses/{id}/release
pub async fn release_license(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let license = state.coordinator.release(id, user.caller()).await?;
    Ok(Json(DataResponse { data: license }))
}

/// POST /api/v1/licenses/cleanup-expired
///
/// Reclaims every expired seat. Public: it only ever applies expiries that
/// are already due.
pub async fn cleanup_expired(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let expired_count = state.coordinator.sweep_expired().await?;
    Ok(Json(DataResponse {
        data: SweepResult { expired_count },
    }))
}
