//! License seat model and its state machine.
//!
//! A license is one shared credential. Its state and the fields that only
//! make sense in that state live together in [`Occupancy`], so a record can
//! never be "available" while still naming a holder.
//!
//! ```text
//! Available   --request(u)-->            Reserved(u)
//! Reserved(u) --activate(u)-->           Active(u)      timer starts
//! Reserved(u) --cancel(u | admin)-->     Available
//! Active(u)   --release(u | admin)-->    Available
//! Active(u)   --extend(u)-->             Active(u)      timer reset
//! Active(u)   --expire, expires_at<=now--> Available
//! ```
//!
//! Every transition here is a pure function from the current record to the
//! next one. Locking and persistence are the coordinator's job.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::ROLE_ADMIN;
use crate::types::{DbId, Timestamp};

/// Default length of an active session.
pub const DEFAULT_ACTIVE_MINUTES: i64 = 120;

/// Default window before expiry in which an extension is accepted.
pub const DEFAULT_EXTEND_WINDOW_MINUTES: i64 = 15;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Timing rules applied on activation and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    /// How long an activation (or extension) keeps the seat.
    pub active_duration: Duration,
    /// Extensions are refused while more than this much time remains.
    pub extend_window: Duration,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            active_duration: Duration::minutes(DEFAULT_ACTIVE_MINUTES),
            extend_window: Duration::minutes(DEFAULT_EXTEND_WINDOW_MINUTES),
        }
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: DbId,
    pub display_name: String,
    pub role: String,
}

impl Caller {
    pub fn new(user_id: DbId, display_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Whether this caller is the given holder.
    pub fn holds(&self, holder: &Holder) -> bool {
        self.user_id == holder.user_id
    }

    /// Capability check for cancel/release: the holder or an admin.
    pub fn may_manage(&self, holder: &Holder) -> bool {
        self.is_admin() || self.holds(holder)
    }

    pub fn as_holder(&self) -> Holder {
        Holder {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
        }
    }
}

/// The user occupying a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub user_id: DbId,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Discriminant of [`Occupancy`], used for storage and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseState {
    Available,
    Reserved,
    Active,
}

impl LicenseState {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseState::Available => "available",
            LicenseState::Reserved => "reserved",
            LicenseState::Active => "active",
        }
    }
}

impl fmt::Display for LicenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(LicenseState::Available),
            "reserved" => Ok(LicenseState::Reserved),
            "active" => Ok(LicenseState::Active),
            other => Err(CoreError::Validation(format!(
                "Unknown license state '{other}'"
            ))),
        }
    }
}

/// Who holds a seat, and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Occupancy {
    Available,
    Reserved {
        holder: Holder,
        reserved_at: Timestamp,
    },
    Active {
        holder: Holder,
        assigned_at: Timestamp,
        expires_at: Timestamp,
    },
}

impl Occupancy {
    pub fn state(&self) -> LicenseState {
        match self {
            Occupancy::Available => LicenseState::Available,
            Occupancy::Reserved { .. } => LicenseState::Reserved,
            Occupancy::Active { .. } => LicenseState::Active,
        }
    }

    pub fn holder(&self) -> Option<&Holder> {
        match self {
            Occupancy::Available => None,
            Occupancy::Reserved { holder, .. } | Occupancy::Active { holder, .. } => Some(holder),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Login material of a shared account. Never interpreted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCredentials {
    pub username: String,
    pub password: String,
    pub email: String,
    pub email_password: String,
}

/// A shared license seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub id: DbId,
    /// Human-facing sequence number, also the OTP lookup key.
    pub no: String,
    #[serde(flatten)]
    pub occupancy: Occupancy,
    pub credentials: LicenseCredentials,
    /// Time of the most recent state transition.
    pub last_activity: Option<Timestamp>,
    /// Row version for compare-and-swap writes.
    #[serde(skip)]
    pub version: i64,
}

/// Input for importing a seat. New seats always start out available.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLicense {
    pub no: String,
    #[serde(flatten)]
    pub credentials: LicenseCredentials,
}

impl License {
    pub fn state(&self) -> LicenseState {
        self.occupancy.state()
    }

    pub fn holder(&self) -> Option<&Holder> {
        self.occupancy.holder()
    }

    pub fn is_available(&self) -> bool {
        matches!(self.occupancy, Occupancy::Available)
    }

    /// Time left on an active seat. Negative once expired but not yet swept.
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        match &self.occupancy {
            Occupancy::Active { expires_at, .. } => Some(*expires_at - now),
            _ => None,
        }
    }

    /// Secret visibility for single-record reads: admins, the holder, or
    /// anyone while the seat is free.
    pub fn can_view_secret(&self, caller: &Caller) -> bool {
        match self.holder() {
            None => true,
            Some(holder) => caller.is_admin() || caller.holds(holder),
        }
    }

    fn with_occupancy(&self, occupancy: Occupancy, now: Timestamp) -> License {
        License {
            occupancy,
            last_activity: Some(now),
            ..self.clone()
        }
    }

    /// `Available -> Reserved(caller)`.
    pub fn request(&self, caller: &Caller, now: Timestamp) -> Result<License, CoreError> {
        match &self.occupancy {
            Occupancy::Available => Ok(self.with_occupancy(
                Occupancy::Reserved {
                    holder: caller.as_holder(),
                    reserved_at: now,
                },
                now,
            )),
            _ => Err(CoreError::Conflict(format!(
                "License {} is no longer available",
                self.no
            ))),
        }
    }

    /// `Reserved(caller) -> Active(caller)`.
    ///
    /// Returns `Ok(None)` when the caller already holds the seat as active,
    /// so a repeated activation is a successful no-op.
    pub fn activate(
        &self,
        caller: &Caller,
        now: Timestamp,
        policy: &LeasePolicy,
    ) -> Result<Option<License>, CoreError> {
        match &self.occupancy {
            Occupancy::Available => Err(CoreError::InvalidState(format!(
                "License {} has no reservation to activate",
                self.no
            ))),
            Occupancy::Reserved { holder, .. } if caller.holds(holder) => {
                Ok(Some(self.with_occupancy(
                    Occupancy::Active {
                        holder: holder.clone(),
                        assigned_at: now,
                        expires_at: now + policy.active_duration,
                    },
                    now,
                )))
            }
            Occupancy::Active { holder, .. } if caller.holds(holder) => Ok(None),
            Occupancy::Reserved { .. } | Occupancy::Active { .. } => Err(CoreError::Forbidden(
                format!("License {} is held by another user", self.no),
            )),
        }
    }

    /// `Active(caller) -> Active(caller)` with a fresh expiry.
    pub fn extend(
        &self,
        caller: &Caller,
        now: Timestamp,
        policy: &LeasePolicy,
    ) -> Result<License, CoreError> {
        match &self.occupancy {
            Occupancy::Active {
                holder,
                assigned_at,
                expires_at,
            } if caller.holds(holder) => {
                let remaining = *expires_at - now;
                if remaining > policy.extend_window {
                    return Err(CoreError::TooEarly {
                        remaining_secs: remaining.num_seconds(),
                    });
                }
                Ok(self.with_occupancy(
                    Occupancy::Active {
                        holder: holder.clone(),
                        assigned_at: *assigned_at,
                        expires_at: now + policy.active_duration,
                    },
                    now,
                ))
            }
            Occupancy::Active { .. } => Err(CoreError::Forbidden(format!(
                "License {} is active for another user",
                self.no
            ))),
            _ => Err(CoreError::InvalidState(format!(
                "License {} is not active",
                self.no
            ))),
        }
    }

    /// `Reserved(u) -> Available`, by `u` or an admin.
    pub fn cancel_reservation(&self, caller: &Caller, now: Timestamp) -> Result<License, CoreError> {
        match &self.occupancy {
            Occupancy::Reserved { holder, .. } if caller.may_manage(holder) => {
                Ok(self.with_occupancy(Occupancy::Available, now))
            }
            Occupancy::Reserved { .. } => Err(CoreError::Forbidden(format!(
                "License {} is reserved by another user",
                self.no
            ))),
            _ => Err(CoreError::InvalidState(format!(
                "License {} is not reserved",
                self.no
            ))),
        }
    }

    /// `Active(u) -> Available`, by `u` or an admin.
    pub fn release(&self, caller: &Caller, now: Timestamp) -> Result<License, CoreError> {
        match &self.occupancy {
            Occupancy::Active { holder, .. } if caller.may_manage(holder) => {
                Ok(self.with_occupancy(Occupancy::Available, now))
            }
            Occupancy::Active { .. } => Err(CoreError::Forbidden(format!(
                "License {} is active for another user",
                self.no
            ))),
            _ => Err(CoreError::InvalidState(format!(
                "License {} is not active",
                self.no
            ))),
        }
    }

    /// `Active -> Available` once `expires_at <= now`; `None` otherwise.
    pub fn expire(&self, now: Timestamp) -> Option<License> {
        match &self.occupancy {
            Occupancy::Active { expires_at, .. } if *expires_at <= now => {
                Some(self.with_occupancy(Occupancy::Available, now))
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Kind of a successful state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseAction {
    Reserved,
    ReservationCancelled,
    Activated,
    Extended,
    Released,
    Expired,
}

impl LicenseAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseAction::Reserved => "reserved",
            LicenseAction::ReservationCancelled => "reservation_cancelled",
            LicenseAction::Activated => "activated",
            LicenseAction::Extended => "extended",
            LicenseAction::Released => "released",
            LicenseAction::Expired => "expired",
        }
    }
}

impl fmt::Display for LicenseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(LicenseAction::Reserved),
            "reservation_cancelled" => Ok(LicenseAction::ReservationCancelled),
            "activated" => Ok(LicenseAction::Activated),
            "extended" => Ok(LicenseAction::Extended),
            "released" => Ok(LicenseAction::Released),
            "expired" => Ok(LicenseAction::Expired),
            other => Err(CoreError::Validation(format!("Unknown action '{other}'"))),
        }
    }
}

/// A committed transition, as handed to observers.
#[derive(Debug, Clone)]
pub struct Transition {
    pub action: LicenseAction,
    /// `None` for system-driven transitions (the expiry sweep).
    pub actor: Option<Caller>,
    pub before: License,
    pub after: License,
    pub at: Timestamp,
}

impl Transition {
    /// The user this transition is attributed to: the acting caller, or the
    /// former holder when the system acted.
    pub fn subject(&self) -> Option<Holder> {
        match &self.actor {
            Some(caller) => Some(caller.as_holder()),
            None => self.before.holder().cloned(),
        }
    }

    /// How long the seat was in active use, for transitions that end it.
    pub fn active_duration(&self) -> Option<Duration> {
        match (&self.action, &self.before.occupancy) {
            (
                LicenseAction::Released | LicenseAction::Expired,
                Occupancy::Active { assigned_at, .. },
            ) => Some(self.at - *assigned_at),
            _ => None,
        }
    }
}
