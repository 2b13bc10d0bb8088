//! Repository for the `usage_logs` table.

use async_trait::async_trait;
use seatpool_core::error::CoreError;
use seatpool_core::types::Timestamp;
use seatpool_core::usage::{
    stats_period_label, NewUsageLog, UsageLog, UsageLogFilter, UsageLogPage, UsageLogStore,
    UsageStats, UserUsage, TOP_USERS_LIMIT,
};
use sqlx::PgPool;

use crate::models::usage_log::{ActionCountRow, UsageLogRow, UserUsageRow};
use crate::{store_error, DbPool};

/// Column list for `usage_logs` queries.
const COLUMNS: &str = "\
    id, user_id, user_name, license_id, license_no, action, occurred_at, duration_seconds";

/// Shared WHERE clause for filtered queries. Parameters `$1..$5` are the
/// optional filters; a NULL parameter disables its condition.
const FILTER_CLAUSE: &str = "\
    ($1::timestamptz IS NULL OR occurred_at >= $1) \
    AND ($2::timestamptz IS NULL OR occurred_at <= $2) \
    AND ($3::bigint IS NULL OR user_id = $3) \
    AND ($4::bigint IS NULL OR license_id = $4) \
    AND ($5::text IS NULL OR action = $5)";

/// Provides data access for the usage log.
pub struct UsageLogRepo;

impl UsageLogRepo {
    /// Append a usage entry, returning the stored row.
    pub async fn insert(pool: &PgPool, entry: &NewUsageLog) -> Result<UsageLogRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO usage_logs \
                 (user_id, user_name, license_id, license_no, action, occurred_at, duration_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UsageLogRow>(&query)
            .bind(entry.user_id)
            .bind(&entry.user_name)
            .bind(entry.license_id)
            .bind(&entry.license_no)
            .bind(entry.action.as_str())
            .bind(entry.timestamp)
            .bind(entry.duration_seconds)
            .fetch_one(pool)
            .await
    }

    /// One page of matching entries, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &UsageLogFilter,
    ) -> Result<Vec<UsageLogRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM usage_logs \
             WHERE {FILTER_CLAUSE} \
             ORDER BY occurred_at DESC, id DESC \
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, UsageLogRow>(&query)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.user_id)
            .bind(filter.license_id)
            .bind(filter.action.map(|a| a.as_str()))
            .bind(filter.limit())
            .bind(filter.skip())
            .fetch_all(pool)
            .await
    }

    /// Count of matching entries, ignoring paging.
    pub async fn count(pool: &PgPool, filter: &UsageLogFilter) -> Result<i64, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM usage_logs WHERE {FILTER_CLAUSE}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.user_id)
            .bind(filter.license_id)
            .bind(filter.action.map(|a| a.as_str()))
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Entries per action since `since`, most frequent first.
    pub async fn action_counts(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<ActionCountRow>, sqlx::Error> {
        sqlx::query_as::<_, ActionCountRow>(
            "SELECT action, COUNT(*) AS count FROM usage_logs \
             WHERE occurred_at >= $1 \
             GROUP BY action \
             ORDER BY count DESC, action",
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Most active users since `since`.
    pub async fn top_users(
        pool: &PgPool,
        since: Timestamp,
        limit: i64,
    ) -> Result<Vec<UserUsageRow>, sqlx::Error> {
        sqlx::query_as::<_, UserUsageRow>(
            "SELECT user_id, \
                    MAX(user_name) AS user_name, \
                    COUNT(*) AS total_actions, \
                    COALESCE(SUM(duration_seconds), 0)::BIGINT AS total_duration \
             FROM usage_logs \
             WHERE occurred_at >= $1 \
             GROUP BY user_id \
             ORDER BY total_actions DESC, user_id \
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

/// [`UsageLogStore`] backed by Postgres.
#[derive(Clone)]
pub struct PgUsageLogStore {
    pool: DbPool,
}

impl PgUsageLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogStore for PgUsageLogStore {
    async fn append(&self, entry: &NewUsageLog) -> Result<UsageLog, CoreError> {
        let row = UsageLogRepo::insert(&self.pool, entry)
            .await
            .map_err(store_error)?;
        UsageLog::try_from(row)
    }

    async fn query(&self, filter: &UsageLogFilter) -> Result<UsageLogPage, CoreError> {
        let rows = UsageLogRepo::list(&self.pool, filter)
            .await
            .map_err(store_error)?;
        let total_count = UsageLogRepo::count(&self.pool, filter)
            .await
            .map_err(store_error)?;

        Ok(UsageLogPage {
            logs: rows
                .into_iter()
                .map(UsageLog::try_from)
                .collect::<Result<_, _>>()?,
            total_count,
            limit: filter.limit(),
            skip: filter.skip(),
        })
    }

    async fn stats(&self, since: Timestamp) -> Result<UsageStats, CoreError> {
        let action_stats = UsageLogRepo::action_counts(&self.pool, since)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(TryFrom::try_from)
            .collect::<Result<_, _>>()?;
        let top_users = UsageLogRepo::top_users(&self.pool, since, TOP_USERS_LIMIT as i64)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(UserUsage::from)
            .collect();

        Ok(UsageStats {
            action_stats,
            top_users,
            period: stats_period_label(),
        })
    }
}
