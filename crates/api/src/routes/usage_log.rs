//! Route definitions for the usage log.

use axum::routing::get;
use axum::Router;

use crate::handlers::usage_log;
use crate::state::AppState;

/// Routes mounted at `/usage-logs`.
///
/// ```text
/// GET    /          -> list_usage_logs (admin only)
/// GET    /stats     -> usage_stats (admin only)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(usage_log::list_usage_logs))
        .route("/stats", get(usage_log::usage_stats))
}
