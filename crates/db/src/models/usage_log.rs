//! Row models for the `usage_logs` table.

use seatpool_core::error::CoreError;
use seatpool_core::types::{DbId, Timestamp};
use seatpool_core::usage::{ActionCount, UsageLog, UserUsage};
use sqlx::FromRow;

/// A row from the `usage_logs` table.
#[derive(Debug, Clone, FromRow)]
pub struct UsageLogRow {
    pub id: DbId,
    pub user_id: DbId,
    pub user_name: String,
    pub license_id: DbId,
    pub license_no: String,
    pub action: String,
    pub occurred_at: Timestamp,
    pub duration_seconds: Option<i64>,
}

impl TryFrom<UsageLogRow> for UsageLog {
    type Error = CoreError;

    fn try_from(row: UsageLogRow) -> Result<Self, Self::Error> {
        Ok(UsageLog {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            license_id: row.license_id,
            license_no: row.license_no,
            action: row.action.parse()?,
            timestamp: row.occurred_at,
            duration_seconds: row.duration_seconds,
        })
    }
}

/// Aggregate row: entries per action.
#[derive(Debug, Clone, FromRow)]
pub struct ActionCountRow {
    pub action: String,
    pub count: i64,
}

impl TryFrom<ActionCountRow> for ActionCount {
    type Error = CoreError;

    fn try_from(row: ActionCountRow) -> Result<Self, Self::Error> {
        Ok(ActionCount {
            action: row.action.parse()?,
            count: row.count,
        })
    }
}

/// Aggregate row: per-user totals.
#[derive(Debug, Clone, FromRow)]
pub struct UserUsageRow {
    pub user_id: DbId,
    pub user_name: String,
    pub total_actions: i64,
    pub total_duration: i64,
}

impl From<UserUsageRow> for UserUsage {
    fn from(row: UserUsageRow) -> Self {
        UserUsage {
            user_id: row.user_id,
            user_name: row.user_name,
            total_actions: row.total_actions,
            total_duration: row.total_duration,
        }
    }
}
