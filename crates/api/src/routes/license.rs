//! Route definitions for license seats.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::license;
use crate::state::AppState;

/// Routes mounted at `/licenses`.
///
/// ```text
/// GET    /                          -> list_licenses
/// POST   /cleanup-expired           -> cleanup_expired (public)
/// GET    /{id}                      -> get_license
/// GET    /{id}/otp                  -> get_otp
/// POST   /{id}/request              -> request_license
/// POST   /{id}/activate             -> activate_license
/// POST   /{id}/extend               -> extend_license
/// POST   /{id}/cancel-reservation   -> cancel_reservation
/// POST   /{id}/release              -> release_license
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(license::list_licenses))
        .route("/cleanup-expired", post(license::cleanup_expired))
        .route("/{id}", get(license::get_license))
        .route("/{id}/otp", get(license::get_otp))
        .route("/{id}/request", post(license::request_license))
        .route("/{id}/activate", post(license::activate_license))
        .route("/{id}/extend", post(license::extend_license))
        .route("/{id}/cancel-reservation", post(license::cancel_reservation))
        .route("/{id}/release", post(license::release_license))
}
