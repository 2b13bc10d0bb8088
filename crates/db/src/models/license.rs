//! Row model for the `licenses` table.
//!
//! The table stores [`Occupancy`] flattened into nullable columns. Conversion
//! back into the domain type rejects any row whose columns do not match its
//! state, which the `ck_licenses_occupancy` constraint should make
//! impossible.

use seatpool_core::error::CoreError;
use seatpool_core::license::{Holder, License, LicenseCredentials, LicenseState, Occupancy};
use seatpool_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `licenses` table.
#[derive(Debug, Clone, FromRow)]
pub struct LicenseRow {
    pub id: DbId,
    pub no: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub email_password: String,
    pub state: String,
    pub holder_user_id: Option<DbId>,
    pub holder_name: Option<String>,
    pub reserved_at: Option<Timestamp>,
    pub assigned_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub last_activity: Option<Timestamp>,
    pub version: i64,
}

/// Column values encoding an [`Occupancy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyColumns {
    pub state: &'static str,
    pub holder_user_id: Option<DbId>,
    pub holder_name: Option<String>,
    pub reserved_at: Option<Timestamp>,
    pub assigned_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

impl From<&Occupancy> for OccupancyColumns {
    fn from(occupancy: &Occupancy) -> Self {
        let empty = OccupancyColumns {
            state: occupancy.state().as_str(),
            holder_user_id: None,
            holder_name: None,
            reserved_at: None,
            assigned_at: None,
            expires_at: None,
        };
        match occupancy {
            Occupancy::Available => empty,
            Occupancy::Reserved {
                holder,
                reserved_at,
            } => OccupancyColumns {
                holder_user_id: Some(holder.user_id),
                holder_name: Some(holder.display_name.clone()),
                reserved_at: Some(*reserved_at),
                ..empty
            },
            Occupancy::Active {
                holder,
                assigned_at,
                expires_at,
            } => OccupancyColumns {
                holder_user_id: Some(holder.user_id),
                holder_name: Some(holder.display_name.clone()),
                assigned_at: Some(*assigned_at),
                expires_at: Some(*expires_at),
                ..empty
            },
        }
    }
}

impl TryFrom<LicenseRow> for License {
    type Error = CoreError;

    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| {
            CoreError::Internal(format!(
                "License row {} in state '{}' is missing {what}",
                row.id, row.state
            ))
        };

        let state: LicenseState = row
            .state
            .parse()
            .map_err(|_| CoreError::Internal(format!("License row {} has unknown state", row.id)))?;

        let holder = || -> Result<Holder, CoreError> {
            Ok(Holder {
                user_id: row.holder_user_id.ok_or_else(|| corrupt("holder_user_id"))?,
                display_name: row
                    .holder_name
                    .clone()
                    .ok_or_else(|| corrupt("holder_name"))?,
            })
        };

        let occupancy = match state {
            LicenseState::Available => Occupancy::Available,
            LicenseState::Reserved => Occupancy::Reserved {
                holder: holder()?,
                reserved_at: row.reserved_at.ok_or_else(|| corrupt("reserved_at"))?,
            },
            LicenseState::Active => Occupancy::Active {
                holder: holder()?,
                assigned_at: row.assigned_at.ok_or_else(|| corrupt("assigned_at"))?,
                expires_at: row.expires_at.ok_or_else(|| corrupt("expires_at"))?,
            },
        };

        Ok(License {
            id: row.id,
            no: row.no,
            occupancy,
            credentials: LicenseCredentials {
                username: row.username,
                password: row.password,
                email: row.email,
                email_password: row.email_password,
            },
            last_activity: row.last_activity,
            version: row.version,
        })
    }
}
