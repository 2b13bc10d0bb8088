//! Storage seam for license records.
//!
//! [`LicenseStore`] is implemented by the Postgres repository in
//! `seatpool-db` and by [`MemoryLicenseStore`] for tests and single-process
//! deployments. Writes go through [`LicenseStore::update_if_version`], a
//! compare-and-swap on the row version, so a store shared by several
//! coordinator processes still admits exactly one winner per transition.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::license::{License, NewLicense, Occupancy};
use crate::types::DbId;

#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// All licenses, ordered by id.
    async fn list(&self) -> Result<Vec<License>, CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<License>, CoreError>;

    /// Insert a new available seat. Returns `None` when a seat with the same
    /// sequence number already exists.
    async fn insert(&self, input: &NewLicense) -> Result<Option<License>, CoreError>;

    /// Persist `next` only if the stored row still has `expected_version`.
    ///
    /// On success the stored record (with its bumped version) is returned.
    /// `None` means the row changed underneath the caller or is gone.
    async fn update_if_version(
        &self,
        id: DbId,
        expected_version: i64,
        next: &License,
    ) -> Result<Option<License>, CoreError>;

    /// Cheap reachability probe for health checks.
    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// In-process license table.
///
/// Records are replaced whole under the write lock, so readers observe
/// either the old or the new record and never a mix of the two.
#[derive(Debug, Default)]
pub struct MemoryLicenseStore {
    inner: RwLock<MemoryTable>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    next_id: DbId,
    rows: BTreeMap<DbId, License>,
}

impl MemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryTable> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryTable> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LicenseStore for MemoryLicenseStore {
    async fn list(&self) -> Result<Vec<License>, CoreError> {
        Ok(self.read().rows.values().cloned().collect())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<License>, CoreError> {
        Ok(self.read().rows.get(&id).cloned())
    }

    async fn insert(&self, input: &NewLicense) -> Result<Option<License>, CoreError> {
        let mut table = self.write();
        if table.rows.values().any(|l| l.no == input.no) {
            return Ok(None);
        }

        table.next_id += 1;
        let license = License {
            id: table.next_id,
            no: input.no.clone(),
            occupancy: Occupancy::Available,
            credentials: input.credentials.clone(),
            last_activity: None,
            version: 0,
        };
        table.rows.insert(license.id, license.clone());
        Ok(Some(license))
    }

    async fn update_if_version(
        &self,
        id: DbId,
        expected_version: i64,
        next: &License,
    ) -> Result<Option<License>, CoreError> {
        let mut table = self.write();
        let Some(current) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if current.version != expected_version {
            return Ok(None);
        }

        *current = License {
            id,
            version: expected_version + 1,
            ..next.clone()
        };
        Ok(Some(current.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseCredentials;

    fn new_license(no: &str) -> NewLicense {
        NewLicense {
            no: no.to_string(),
            credentials: LicenseCredentials {
                username: format!("user{no}"),
                password: "pw".to_string(),
                email: format!("license{no}@example.com"),
                email_password: "mailpw".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_rejects_duplicate_numbers() {
        let store = MemoryLicenseStore::new();

        let first = store.insert(&new_license("1")).await.unwrap().unwrap();
        let second = store.insert(&new_license("2")).await.unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(first.is_available());

        assert!(store.insert(&new_license("1")).await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_if_version_bumps_version_once() {
        let store = MemoryLicenseStore::new();
        let license = store.insert(&new_license("1")).await.unwrap().unwrap();

        let mut next = license.clone();
        next.last_activity = Some(chrono::Utc::now());

        let stored = store
            .update_if_version(license.id, 0, &next)
            .await
            .unwrap()
            .expect("first write should win");
        assert_eq!(stored.version, 1);

        // A second writer that read version 0 loses.
        let stale = store.update_if_version(license.id, 0, &next).await.unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn update_unknown_id_returns_none() {
        let store = MemoryLicenseStore::new();
        let license = store.insert(&new_license("1")).await.unwrap().unwrap();

        assert!(store
            .update_if_version(42, 0, &license)
            .await
            .unwrap()
            .is_none());
        assert!(store.find_by_id(42).await.unwrap().is_none());
    }
}
