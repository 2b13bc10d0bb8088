//! License lifecycle coordinator.
//!
//! [`LicenseCoordinator`] is the single owner of every license write. Each
//! mutating operation takes that license's lock, reloads the record, applies
//! the pure transition from [`crate::license`] and writes the result with a
//! version compare-and-swap. Operations on different licenses never share a
//! lock. Reads go straight to the store without locking.
//!
//! Expiry is lazy: nothing runs per license in the background. An active
//! seat stays active past `expires_at` until [`LicenseCoordinator::sweep_expired`]
//! reclaims it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::license::{Caller, LeasePolicy, License, LicenseAction, Occupancy, Transition};
use crate::store::LicenseStore;
use crate::types::{DbId, Timestamp};

/// Receives every committed transition, in commit order per license.
///
/// Called while the license lock is still held, so implementations must
/// not block. Publishing to a channel is the intended use.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, transition: &Transition);
}

// ---------------------------------------------------------------------------
// Lock table
// ---------------------------------------------------------------------------

/// One async mutex per license id, created on first use.
///
/// Only ids that exist in the store get an entry. Licenses are never
/// deleted by this subsystem, so entries are never evicted.
#[derive(Default)]
struct LockTable {
    locks: Mutex<HashMap<DbId, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    async fn acquire(&self, id: DbId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Result of running a transition under the license lock.
struct Applied {
    license: License,
    changed: bool,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct LicenseCoordinator {
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    policy: LeasePolicy,
    observers: Vec<Arc<dyn TransitionObserver>>,
    locks: LockTable,
}

impl LicenseCoordinator {
    pub fn new(store: Arc<dyn LicenseStore>, clock: Arc<dyn Clock>, policy: LeasePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            observers: Vec::new(),
            locks: LockTable::default(),
        }
    }

    /// Register an observer for committed transitions.
    pub fn with_observer(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn policy(&self) -> &LeasePolicy {
        &self.policy
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn store(&self) -> &Arc<dyn LicenseStore> {
        &self.store
    }

    // --- Reads --------------------------------------------------------------

    /// Snapshot of the whole pool, ordered by id.
    pub async fn list(&self) -> Result<Vec<License>, CoreError> {
        self.store.list().await
    }

    /// Single license, subject to the secret visibility rule.
    pub async fn get(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let license = self.load(id).await?;
        if !license.can_view_secret(caller) {
            return Err(CoreError::Forbidden(format!(
                "License {} is held by another user",
                license.no
            )));
        }
        Ok(license)
    }

    /// Returns the license if the caller may read its OTP: an admin, or the
    /// current holder of a reserved or active seat.
    pub async fn authorize_otp(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let license = self.load(id).await?;
        let permitted = caller.is_admin() || license.holder().is_some_and(|h| caller.holds(h));
        if !permitted {
            return Err(CoreError::Forbidden(format!(
                "License {} is not held by the caller",
                license.no
            )));
        }
        Ok(license)
    }

    // --- Mutations ----------------------------------------------------------

    pub async fn request(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let applied = self
            .apply(id, LicenseAction::Reserved, Some(caller), |license, now| {
                license.request(caller, now).map(Some)
            })
            .await?;
        Ok(applied.license)
    }

    /// Activation of an already active seat by its holder is a no-op success.
    pub async fn activate(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let policy = self.policy;
        let applied = self
            .apply(id, LicenseAction::Activated, Some(caller), |license, now| {
                license.activate(caller, now, &policy)
            })
            .await?;
        Ok(applied.license)
    }

    pub async fn extend(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let policy = self.policy;
        let applied = self
            .apply(id, LicenseAction::Extended, Some(caller), |license, now| {
                license.extend(caller, now, &policy).map(Some)
            })
            .await?;
        Ok(applied.license)
    }

    pub async fn cancel_reservation(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let applied = self
            .apply(
                id,
                LicenseAction::ReservationCancelled,
                Some(caller),
                |license, now| license.cancel_reservation(caller, now).map(Some),
            )
            .await?;
        Ok(applied.license)
    }

    pub async fn release(&self, id: DbId, caller: &Caller) -> Result<License, CoreError> {
        let applied = self
            .apply(id, LicenseAction::Released, Some(caller), |license, now| {
                license.release(caller, now).map(Some)
            })
            .await?;
        Ok(applied.license)
    }

    /// Reclaim every active seat whose expiry has passed.
    ///
    /// Each candidate is re-checked under its own lock, so a seat extended
    /// or released between the scan and the write is left alone. Returns the
    /// number of seats reclaimed.
    pub async fn sweep_expired(&self) -> Result<usize, CoreError> {
        let now = self.clock.now();
        let candidates: Vec<DbId> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|l| matches!(l.occupancy, Occupancy::Active { expires_at, .. } if expires_at <= now))
            .map(|l| l.id)
            .collect();

        let mut reclaimed = 0;
        for id in candidates {
            match self
                .apply(id, LicenseAction::Expired, None, |license, now| {
                    Ok(license.expire(now))
                })
                .await
            {
                Ok(applied) if applied.changed => reclaimed += 1,
                Ok(_) => {}
                Err(CoreError::Conflict(_) | CoreError::NotFound { .. }) => {
                    tracing::debug!(license_id = id, "Sweep skipped license changed concurrently");
                }
                Err(e) => return Err(e),
            }
        }

        if reclaimed > 0 {
            tracing::info!(reclaimed, "Expired licenses reclaimed");
        }
        Ok(reclaimed)
    }

    // --- Internals ----------------------------------------------------------

    async fn load(&self, id: DbId) -> Result<License, CoreError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "License",
                id,
            })
    }

    /// Run `step` against the current record under the license lock and
    /// persist its result. `step` returning `Ok(None)` leaves the record as
    /// is. A failed step or a lost compare-and-swap writes nothing.
    async fn apply<F>(
        &self,
        id: DbId,
        action: LicenseAction,
        actor: Option<&Caller>,
        step: F,
    ) -> Result<Applied, CoreError>
    where
        F: FnOnce(&License, Timestamp) -> Result<Option<License>, CoreError>,
    {
        // Unknown ids fail here, before they can claim a lock entry.
        self.load(id).await?;
        let _guard = self.locks.acquire(id).await;

        let current = self.load(id).await?;
        let now = self.clock.now();

        let Some(next) = step(&current, now)? else {
            return Ok(Applied {
                license: current,
                changed: false,
            });
        };

        let stored = self
            .store
            .update_if_version(id, current.version, &next)
            .await?
            .ok_or_else(|| {
                CoreError::Conflict(format!(
                    "License {} changed concurrently, refresh and retry",
                    current.no
                ))
            })?;

        tracing::info!(
            license_id = id,
            license_no = %stored.no,
            action = %action,
            user_id = actor.map(|c| c.user_id),
            state = %stored.state(),
            "License transition committed"
        );

        let transition = Transition {
            action,
            actor: actor.cloned(),
            before: current,
            after: stored.clone(),
            at: now,
        };
        for observer in &self.observers {
            observer.on_transition(&transition);
        }

        Ok(Applied {
            license: stored,
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::license::{LicenseCredentials, LicenseState, NewLicense};
    use crate::roles::ROLE_ADMIN;
    use crate::store::MemoryLicenseStore;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Transition>>,
    }

    impl TransitionObserver for Recorder {
        fn on_transition(&self, transition: &Transition) {
            self.seen.lock().unwrap().push(transition.clone());
        }
    }

    impl Recorder {
        fn actions(&self) -> Vec<LicenseAction> {
            self.seen.lock().unwrap().iter().map(|t| t.action).collect()
        }
    }

    struct Harness {
        coordinator: Arc<LicenseCoordinator>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryLicenseStore>,
        recorder: Arc<Recorder>,
    }

    async fn harness(seats: usize) -> Harness {
        let store = Arc::new(MemoryLicenseStore::new());
        for n in 1..=seats {
            store
                .insert(&NewLicense {
                    no: n.to_string(),
                    credentials: LicenseCredentials {
                        username: format!("shared{n}"),
                        password: "pw".into(),
                        email: format!("license{n}@example.com"),
                        email_password: "mailpw".into(),
                    },
                })
                .await
                .unwrap();
        }
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let recorder = Arc::new(Recorder::default());
        let coordinator = LicenseCoordinator::new(
            store.clone(),
            clock.clone(),
            LeasePolicy::default(),
        )
        .with_observer(recorder.clone());

        Harness {
            coordinator: Arc::new(coordinator),
            clock,
            store,
            recorder,
        }
    }

    fn user(id: DbId, name: &str) -> Caller {
        Caller::new(id, name, "user")
    }

    fn assert_occupancy_consistent(license: &License) {
        match &license.occupancy {
            Occupancy::Available => assert!(license.holder().is_none()),
            Occupancy::Reserved { holder, .. } | Occupancy::Active { holder, .. } => {
                assert!(holder.user_id > 0)
            }
        }
    }

    #[tokio::test]
    async fn full_lifecycle_scenario() {
        let h = harness(1).await;
        let a = user(1, "A");
        let b = user(2, "B");

        let reserved = h.coordinator.request(1, &a).await.unwrap();
        assert_eq!(reserved.state(), LicenseState::Reserved);

        assert_matches!(h.coordinator.request(1, &b).await, Err(CoreError::Conflict(_)));

        let start = h.clock.now();
        let active = h.coordinator.activate(1, &a).await.unwrap();
        assert_matches!(
            active.occupancy,
            Occupancy::Active { expires_at, .. } if expires_at == start + Duration::minutes(120)
        );

        h.clock.advance(Duration::minutes(121));
        assert_eq!(h.coordinator.sweep_expired().await.unwrap(), 1);

        let after = h.store.find_by_id(1).await.unwrap().unwrap();
        assert!(after.is_available());
        assert_eq!(
            h.recorder.actions(),
            vec![
                LicenseAction::Reserved,
                LicenseAction::Activated,
                LicenseAction::Expired
            ]
        );
    }

    #[tokio::test]
    async fn unknown_ids_do_not_claim_lock_entries() {
        let h = harness(1).await;
        let a = user(1, "A");

        for id in 2..=500 {
            assert_matches!(
                h.coordinator.request(id, &a).await,
                Err(CoreError::NotFound { .. })
            );
            assert_matches!(
                h.coordinator.release(id, &a).await,
                Err(CoreError::NotFound { .. })
            );
        }
        assert_eq!(h.coordinator.locks.len(), 0);

        h.coordinator.request(1, &a).await.unwrap();
        assert_eq!(h.coordinator.locks.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_have_exactly_one_winner() {
        let h = harness(1).await;

        let mut tasks = Vec::new();
        for uid in 1..=16 {
            let coordinator = Arc::clone(&h.coordinator);
            tasks.push(tokio::spawn(async move {
                let caller = user(uid, "racer");
                (uid, coordinator.request(1, &caller).await)
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            let (uid, result) = task.await.unwrap();
            match result {
                Ok(_) => winners.push(uid),
                Err(CoreError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1, "exactly one request must win");
        let final_state = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(final_state.state(), LicenseState::Reserved);
        assert_eq!(final_state.holder().unwrap().user_id, winners[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn coordinators_sharing_a_store_still_admit_one_winner() {
        // Two processes with separate lock tables: the version check decides.
        let h = harness(1).await;
        let other = Arc::new(LicenseCoordinator::new(
            h.store.clone(),
            h.clock.clone(),
            LeasePolicy::default(),
        ));

        let mut tasks = Vec::new();
        for uid in 1..=8 {
            let coordinator = if uid % 2 == 0 {
                Arc::clone(&h.coordinator)
            } else {
                Arc::clone(&other)
            };
            tasks.push(tokio::spawn(async move {
                coordinator.request(1, &user(uid, "racer")).await
            }));
        }

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(CoreError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn lock_on_one_license_does_not_block_another() {
        let h = harness(2).await;
        let _held = h.coordinator.locks.acquire(1).await;

        let result = tokio::time::timeout(
            StdDuration::from_secs(1),
            h.coordinator.request(2, &user(1, "A")),
        )
        .await
        .expect("request on another license must not wait");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn activate_by_non_holder_leaves_state_unchanged() {
        let h = harness(1).await;
        let a = user(1, "A");
        let b = user(2, "B");

        let reserved = h.coordinator.request(1, &a).await.unwrap();
        assert_matches!(h.coordinator.activate(1, &b).await, Err(CoreError::Forbidden(_)));

        let after = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(after, reserved);
    }

    #[tokio::test]
    async fn activate_is_idempotent_and_not_recorded_twice() {
        let h = harness(1).await;
        let a = user(1, "A");

        h.coordinator.request(1, &a).await.unwrap();
        let first = h.coordinator.activate(1, &a).await.unwrap();
        h.clock.advance(Duration::minutes(5));
        let second = h.coordinator.activate(1, &a).await.unwrap();

        assert_eq!(first, second, "repeat activation must not reset the timer");
        assert_eq!(
            h.recorder.actions(),
            vec![LicenseAction::Reserved, LicenseAction::Activated]
        );
    }

    #[tokio::test]
    async fn extend_too_early_keeps_expiry() {
        let h = harness(1).await;
        let a = user(1, "A");
        h.coordinator.request(1, &a).await.unwrap();
        let active = h.coordinator.activate(1, &a).await.unwrap();

        // 60 minutes remain.
        h.clock.advance(Duration::minutes(60));
        assert_matches!(
            h.coordinator.extend(1, &a).await,
            Err(CoreError::TooEarly { .. })
        );
        let after = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(after.occupancy, active.occupancy);
    }

    #[tokio::test]
    async fn extend_near_expiry_resets_timer() {
        let h = harness(1).await;
        let a = user(1, "A");
        h.coordinator.request(1, &a).await.unwrap();
        h.coordinator.activate(1, &a).await.unwrap();

        // 5 minutes remain.
        h.clock.advance(Duration::minutes(115));
        let now = h.clock.now();
        let extended = h.coordinator.extend(1, &a).await.unwrap();
        assert_eq!(extended.remaining(now), Some(Duration::minutes(120)));
    }

    #[tokio::test]
    async fn sweep_twice_without_clock_advance_is_noop() {
        let h = harness(3).await;
        for id in 1..=2 {
            let caller = user(id, "holder");
            h.coordinator.request(id, &caller).await.unwrap();
            h.coordinator.activate(id, &caller).await.unwrap();
        }

        h.clock.advance(Duration::minutes(120));
        assert_eq!(h.coordinator.sweep_expired().await.unwrap(), 2);
        assert_eq!(h.coordinator.sweep_expired().await.unwrap(), 0);

        for license in h.coordinator.list().await.unwrap() {
            assert!(license.is_available());
            assert_occupancy_consistent(&license);
        }
    }

    #[tokio::test]
    async fn sweep_ignores_reserved_and_unexpired_seats() {
        let h = harness(2).await;
        let a = user(1, "A");
        let b = user(2, "B");
        h.coordinator.request(1, &a).await.unwrap();
        h.coordinator.request(2, &b).await.unwrap();
        h.coordinator.activate(2, &b).await.unwrap();

        h.clock.advance(Duration::minutes(30));
        assert_eq!(h.coordinator.sweep_expired().await.unwrap(), 0);

        let states: Vec<_> = h
            .coordinator
            .list()
            .await
            .unwrap()
            .iter()
            .map(License::state)
            .collect();
        assert_eq!(states, vec![LicenseState::Reserved, LicenseState::Active]);
    }

    #[tokio::test]
    async fn round_trip_restores_initial_state() {
        let h = harness(1).await;
        let a = user(1, "A");
        let initial = h.store.find_by_id(1).await.unwrap().unwrap();

        h.coordinator.request(1, &a).await.unwrap();
        h.coordinator.activate(1, &a).await.unwrap();
        let released = h.coordinator.release(1, &a).await.unwrap();

        assert_eq!(released.occupancy, initial.occupancy);
        assert_eq!(released.credentials, initial.credentials);
        assert!(released.last_activity.is_some());
    }

    #[tokio::test]
    async fn admin_may_cancel_and_release_for_others() {
        let h = harness(2).await;
        let a = user(1, "A");
        let admin = Caller::new(9, "Root", ROLE_ADMIN);

        h.coordinator.request(1, &a).await.unwrap();
        assert!(h
            .coordinator
            .cancel_reservation(1, &admin)
            .await
            .unwrap()
            .is_available());

        h.coordinator.request(2, &a).await.unwrap();
        h.coordinator.activate(2, &a).await.unwrap();
        assert_matches!(
            h.coordinator.release(2, &user(2, "B")).await,
            Err(CoreError::Forbidden(_))
        );
        assert!(h.coordinator.release(2, &admin).await.unwrap().is_available());
    }

    #[tokio::test]
    async fn get_enforces_secret_visibility() {
        let h = harness(1).await;
        let a = user(1, "A");
        let b = user(2, "B");

        assert!(h.coordinator.get(1, &b).await.is_ok());
        h.coordinator.request(1, &a).await.unwrap();

        assert!(h.coordinator.get(1, &a).await.is_ok());
        assert_matches!(h.coordinator.get(1, &b).await, Err(CoreError::Forbidden(_)));
        assert_matches!(
            h.coordinator.get(404, &a).await,
            Err(CoreError::NotFound { entity: "License", id: 404 })
        );
    }

    #[tokio::test]
    async fn authorize_otp_requires_holder_or_admin() {
        let h = harness(1).await;
        let a = user(1, "A");
        let b = user(2, "B");
        let admin = Caller::new(9, "Root", ROLE_ADMIN);

        assert_matches!(
            h.coordinator.authorize_otp(1, &a).await,
            Err(CoreError::Forbidden(_))
        );
        assert!(h.coordinator.authorize_otp(1, &admin).await.is_ok());

        h.coordinator.request(1, &a).await.unwrap();
        assert!(h.coordinator.authorize_otp(1, &a).await.is_ok());
        assert_matches!(
            h.coordinator.authorize_otp(1, &b).await,
            Err(CoreError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn failed_operations_write_nothing() {
        let h = harness(1).await;
        let a = user(1, "A");
        let before = h.store.find_by_id(1).await.unwrap().unwrap();

        assert_matches!(h.coordinator.activate(1, &a).await, Err(CoreError::InvalidState(_)));
        assert_matches!(h.coordinator.extend(1, &a).await, Err(CoreError::InvalidState(_)));
        assert_matches!(h.coordinator.release(1, &a).await, Err(CoreError::InvalidState(_)));
        assert_matches!(
            h.coordinator.cancel_reservation(1, &a).await,
            Err(CoreError::InvalidState(_))
        );

        let after = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert!(h.recorder.actions().is_empty());
    }
}
