//! Usage log: an append-only record of seat transitions.
//!
//! Entries are produced from committed [`Transition`]s by the recorder in
//! `seatpool-events` and read back by admins through filtered pages and a
//! 30-day summary.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::license::{LicenseAction, Transition};
use crate::types::{DbId, Timestamp};

/// Default page size for usage log queries.
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Upper bound on a single page.
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Window covered by [`UsageStats`].
pub const STATS_PERIOD_DAYS: i64 = 30;

/// Number of users listed in [`UsageStats::top_users`].
pub const TOP_USERS_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A stored usage log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageLog {
    pub id: DbId,
    pub user_id: DbId,
    pub user_name: String,
    pub license_id: DbId,
    pub license_no: String,
    pub action: LicenseAction,
    pub timestamp: Timestamp,
    /// Active time for `released` and `expired` entries.
    pub duration_seconds: Option<i64>,
}

/// A usage log row before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageLog {
    pub user_id: DbId,
    pub user_name: String,
    pub license_id: DbId,
    pub license_no: String,
    pub action: LicenseAction,
    pub timestamp: Timestamp,
    pub duration_seconds: Option<i64>,
}

impl NewUsageLog {
    /// Build the entry for a committed transition.
    ///
    /// Returns `None` only if nobody can be attributed, which cannot happen
    /// for the transitions the coordinator produces.
    pub fn from_transition(transition: &Transition) -> Option<Self> {
        let subject = transition.subject()?;
        Some(Self {
            user_id: subject.user_id,
            user_name: subject.display_name,
            license_id: transition.after.id,
            license_no: transition.after.no.clone(),
            action: transition.action,
            timestamp: transition.at,
            duration_seconds: transition.active_duration().map(|d| d.num_seconds()),
        })
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Filter and paging for usage log queries. All filters are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageLogFilter {
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub user_id: Option<DbId>,
    pub license_id: Option<DbId>,
    pub action: Option<LicenseAction>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

impl UsageLogFilter {
    pub fn matches(&self, log: &UsageLog) -> bool {
        self.start_date.map_or(true, |start| log.timestamp >= start)
            && self.end_date.map_or(true, |end| log.timestamp <= end)
            && self.user_id.map_or(true, |id| log.user_id == id)
            && self.license_id.map_or(true, |id| log.license_id == id)
            && self.action.map_or(true, |action| log.action == action)
    }

    /// Effective page size, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }
}

/// One page of usage logs, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct UsageLogPage {
    pub logs: Vec<UsageLog>,
    pub total_count: i64,
    pub limit: i64,
    pub skip: i64,
}

/// Number of entries per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: LicenseAction,
    pub count: i64,
}

/// Per-user activity totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUsage {
    pub user_id: DbId,
    pub user_name: String,
    pub total_actions: i64,
    /// Sum of `duration_seconds` over the user's entries.
    pub total_duration: i64,
}

/// Summary over the last [`STATS_PERIOD_DAYS`] days.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub action_stats: Vec<ActionCount>,
    pub top_users: Vec<UserUsage>,
    pub period: String,
}

/// Start of the stats window ending at `now`.
pub fn stats_window_start(now: Timestamp) -> Timestamp {
    now - Duration::days(STATS_PERIOD_DAYS)
}

pub fn stats_period_label() -> String {
    format!("Last {STATS_PERIOD_DAYS} days")
}

/// Summarize entries at or after `since`.
///
/// Actions are ordered by descending count, users by descending action
/// count with the user id as tie-breaker.
pub fn summarize<'a>(logs: impl IntoIterator<Item = &'a UsageLog>, since: Timestamp) -> UsageStats {
    let mut by_action: HashMap<LicenseAction, i64> = HashMap::new();
    let mut by_user: HashMap<DbId, UserUsage> = HashMap::new();

    for log in logs.into_iter().filter(|l| l.timestamp >= since) {
        *by_action.entry(log.action).or_default() += 1;

        let user = by_user.entry(log.user_id).or_insert_with(|| UserUsage {
            user_id: log.user_id,
            user_name: log.user_name.clone(),
            total_actions: 0,
            total_duration: 0,
        });
        user.total_actions += 1;
        user.total_duration += log.duration_seconds.unwrap_or(0);
    }

    let mut action_stats: Vec<ActionCount> = by_action
        .into_iter()
        .map(|(action, count)| ActionCount { action, count })
        .collect();
    action_stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.action.as_str().cmp(b.action.as_str()))
    });

    let mut top_users: Vec<UserUsage> = by_user.into_values().collect();
    top_users.sort_by(|a, b| {
        b.total_actions
            .cmp(&a.total_actions)
            .then(a.user_id.cmp(&b.user_id))
    });
    top_users.truncate(TOP_USERS_LIMIT);

    UsageStats {
        action_stats,
        top_users,
        period: stats_period_label(),
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[async_trait]
pub trait UsageLogStore: Send + Sync {
    async fn append(&self, entry: &NewUsageLog) -> Result<UsageLog, CoreError>;

    async fn query(&self, filter: &UsageLogFilter) -> Result<UsageLogPage, CoreError>;

    /// Summary of entries at or after `since`.
    async fn stats(&self, since: Timestamp) -> Result<UsageStats, CoreError>;
}

/// In-process usage log.
#[derive(Debug, Default)]
pub struct MemoryUsageLogStore {
    rows: RwLock<Vec<UsageLog>>,
}

impl MemoryUsageLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLogStore for MemoryUsageLogStore {
    async fn append(&self, entry: &NewUsageLog) -> Result<UsageLog, CoreError> {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let log = UsageLog {
            id: rows.len() as DbId + 1,
            user_id: entry.user_id,
            user_name: entry.user_name.clone(),
            license_id: entry.license_id,
            license_no: entry.license_no.clone(),
            action: entry.action,
            timestamp: entry.timestamp,
            duration_seconds: entry.duration_seconds,
        };
        rows.push(log.clone());
        Ok(log)
    }

    async fn query(&self, filter: &UsageLogFilter) -> Result<UsageLogPage, CoreError> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<&UsageLog> = rows.iter().filter(|l| filter.matches(l)).collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let limit = filter.limit();
        let skip = filter.skip();
        let logs = matching
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(|l| (*l).clone())
            .collect();

        Ok(UsageLogPage {
            logs,
            total_count: matching.len() as i64,
            limit,
            skip,
        })
    }

    async fn stats(&self, since: Timestamp) -> Result<UsageStats, CoreError> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        Ok(summarize(rows.iter(), since))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn entry(user_id: DbId, action: LicenseAction, at: Timestamp, secs: Option<i64>) -> NewUsageLog {
        NewUsageLog {
            user_id,
            user_name: format!("user{user_id}"),
            license_id: 1,
            license_no: "1".to_string(),
            action,
            timestamp: at,
            duration_seconds: secs,
        }
    }

    #[tokio::test]
    async fn query_filters_and_pages_newest_first() {
        let store = MemoryUsageLogStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .append(&entry(1, LicenseAction::Activated, base + Duration::minutes(i), None))
                .await
                .unwrap();
        }
        store
            .append(&entry(2, LicenseAction::Released, base, Some(60)))
            .await
            .unwrap();

        let page = store
            .query(&UsageLogFilter {
                user_id: Some(1),
                limit: Some(2),
                skip: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total_count, 5);
        assert_eq!(page.logs.len(), 2);
        assert_eq!(page.logs[0].timestamp, base + Duration::minutes(3));
        assert_eq!(page.logs[1].timestamp, base + Duration::minutes(2));

        let released = store
            .query(&UsageLogFilter {
                action: Some(LicenseAction::Released),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(released.total_count, 1);
        assert_eq!(released.logs[0].duration_seconds, Some(60));
    }

    #[test]
    fn filter_date_bounds_are_inclusive() {
        let at = Utc::now();
        let log = UsageLog {
            id: 1,
            user_id: 1,
            user_name: "u".into(),
            license_id: 3,
            license_no: "3".into(),
            action: LicenseAction::Extended,
            timestamp: at,
            duration_seconds: None,
        };

        let filter = UsageLogFilter {
            start_date: Some(at),
            end_date: Some(at),
            license_id: Some(3),
            ..Default::default()
        };
        assert!(filter.matches(&log));

        let later = UsageLogFilter {
            start_date: Some(at + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!later.matches(&log));
    }

    #[test]
    fn limit_is_clamped() {
        let filter = UsageLogFilter {
            limit: Some(10_000),
            skip: Some(-4),
            ..Default::default()
        };
        assert_eq!(filter.limit(), MAX_PAGE_LIMIT);
        assert_eq!(filter.skip(), 0);
        assert_eq!(UsageLogFilter::default().limit(), DEFAULT_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn stats_count_actions_and_rank_users_within_window() {
        let store = MemoryUsageLogStore::new();
        let now = Utc::now();
        let old = now - Duration::days(45);

        store.append(&entry(1, LicenseAction::Activated, now, None)).await.unwrap();
        store.append(&entry(1, LicenseAction::Released, now, Some(600))).await.unwrap();
        store.append(&entry(2, LicenseAction::Activated, now, None)).await.unwrap();
        store.append(&entry(2, LicenseAction::Expired, old, Some(7200))).await.unwrap();

        let stats = store.stats(stats_window_start(now)).await.unwrap();

        assert_eq!(stats.period, "Last 30 days");
        assert_eq!(
            stats.action_stats[0],
            ActionCount {
                action: LicenseAction::Activated,
                count: 2
            }
        );
        assert!(stats
            .action_stats
            .iter()
            .all(|a| a.action != LicenseAction::Expired));

        assert_eq!(stats.top_users[0].user_id, 1);
        assert_eq!(stats.top_users[0].total_actions, 2);
        assert_eq!(stats.top_users[0].total_duration, 600);
        assert_eq!(stats.top_users[1].total_duration, 0);
    }
}
