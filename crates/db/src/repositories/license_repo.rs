//! Repository for the `licenses` table.
//!
//! State transitions are written with a version predicate
//! (`WHERE id = $1 AND version = $2`) so two writers racing on the same row
//! cannot both succeed, even across processes.

use async_trait::async_trait;
use seatpool_core::error::CoreError;
use seatpool_core::license::{License, NewLicense};
use seatpool_core::store::LicenseStore;
use seatpool_core::types::DbId;
use sqlx::PgPool;

use crate::models::license::{LicenseRow, OccupancyColumns};
use crate::{store_error, DbPool};

/// Column list for `licenses` queries.
const COLUMNS: &str = "\
    id, no, username, password, email, email_password, \
    state, holder_user_id, holder_name, reserved_at, assigned_at, expires_at, \
    last_activity, version";

/// Provides data access for license seats.
pub struct LicenseRepo;

impl LicenseRepo {
    /// List all licenses ordered by id.
    pub async fn list(pool: &PgPool) -> Result<Vec<LicenseRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM licenses ORDER BY id");
        sqlx::query_as::<_, LicenseRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Find a license by its id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<LicenseRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM licenses WHERE id = $1");
        sqlx::query_as::<_, LicenseRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert an available seat.
    ///
    /// Returns `None` if a seat with the same `no` already exists.
    pub async fn insert(
        pool: &PgPool,
        input: &NewLicense,
    ) -> Result<Option<LicenseRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO licenses (no, username, password, email, email_password) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (no) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LicenseRow>(&query)
            .bind(&input.no)
            .bind(&input.credentials.username)
            .bind(&input.credentials.password)
            .bind(&input.credentials.email)
            .bind(&input.credentials.email_password)
            .fetch_optional(pool)
            .await
    }

    /// Write the occupancy of `next` if the row is still at `expected_version`.
    ///
    /// Bumps `version` on success. Returns `None` when the predicate did not
    /// match (the row moved on, or does not exist).
    pub async fn update_occupancy_if_version(
        pool: &PgPool,
        id: DbId,
        expected_version: i64,
        next: &License,
    ) -> Result<Option<LicenseRow>, sqlx::Error> {
        let columns = OccupancyColumns::from(&next.occupancy);
        let query = format!(
            "UPDATE licenses SET \
                 state = $3, \
                 holder_user_id = $4, \
                 holder_name = $5, \
                 reserved_at = $6, \
                 assigned_at = $7, \
                 expires_at = $8, \
                 last_activity = $9, \
                 version = version + 1, \
                 updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LicenseRow>(&query)
            .bind(id)
            .bind(expected_version)
            .bind(columns.state)
            .bind(columns.holder_user_id)
            .bind(&columns.holder_name)
            .bind(columns.reserved_at)
            .bind(columns.assigned_at)
            .bind(columns.expires_at)
            .bind(next.last_activity)
            .fetch_optional(pool)
            .await
    }
}

/// [`LicenseStore`] backed by Postgres.
#[derive(Clone)]
pub struct PgLicenseStore {
    pool: DbPool,
}

impl PgLicenseStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LicenseStore for PgLicenseStore {
    async fn list(&self) -> Result<Vec<License>, CoreError> {
        LicenseRepo::list(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(License::try_from)
            .collect()
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<License>, CoreError> {
        LicenseRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_error)?
            .map(License::try_from)
            .transpose()
    }

    async fn insert(&self, input: &NewLicense) -> Result<Option<License>, CoreError> {
        LicenseRepo::insert(&self.pool, input)
            .await
            .map_err(store_error)?
            .map(License::try_from)
            .transpose()
    }

    async fn update_if_version(
        &self,
        id: DbId,
        expected_version: i64,
        next: &License,
    ) -> Result<Option<License>, CoreError> {
        LicenseRepo::update_occupancy_if_version(&self.pool, id, expected_version, next)
            .await
            .map_err(store_error)?
            .map(License::try_from)
            .transpose()
    }

    async fn health_check(&self) -> Result<(), CoreError> {
        crate::health_check(&self.pool).await.map_err(store_error)
    }
}
