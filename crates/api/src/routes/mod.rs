pub mod health;
pub mod license;
pub mod usage_log;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /licenses                                  list (auth)
/// /licenses/cleanup-expired                  sweep expired seats (public)
/// /licenses/{id}                             get (auth)
/// /licenses/{id}/otp                         latest OTP (holder or admin)
/// /licenses/{id}/request                     reserve (auth)
/// /licenses/{id}/activate                    activate (holder)
/// /licenses/{id}/extend                      extend (holder)
/// /licenses/{id}/cancel-reservation          cancel (holder or admin)
/// /licenses/{id}/release                     release (holder or admin)
///
/// /usage-logs                                filtered log (admin only)
/// /usage-logs/stats                          summary (admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/licenses", license::router())
        .nest("/usage-logs", usage_log::router())
}
