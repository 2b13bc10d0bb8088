//! Handlers for the usage log. Admin only.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use seatpool_core::usage::{stats_window_start, UsageLogFilter};

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/usage-logs
///
/// Filtered, paged entries, newest first. Accepts `start_date`, `end_date`
/// (RFC 3339), `user_id`, `license_id`, `action`, `limit` and `skip`.
pub async fn list_usage_logs(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(filter): Query<UsageLogFilter>,
) -> AppResult<impl IntoResponse> {
    let page = state.usage_store.query(&filter).await?;
    Ok(Json(DataResponse { data: page }))
}

/// GET /api/v1/usage-logs/stats
///
/// Per-action counts and the most active users over the stats period.
pub async fn usage_stats(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let since = stats_window_start(state.coordinator.now());
    let stats = state.usage_store.stats(since).await?;
    Ok(Json(DataResponse { data: stats }))
}
