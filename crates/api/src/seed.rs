//! Startup import of license seats from a JSON file.
//!
//! The file holds an array of
//! `{ "no", "username", "password", "email", "email_password" }` objects.
//! Seats whose `no` already exists are left untouched, so the import can run
//! on every start.

use std::path::Path;

use seatpool_core::error::CoreError;
use seatpool_core::license::NewLicense;
use seatpool_core::store::LicenseStore;

/// Parse a seed document.
pub fn parse_seed(json: &str) -> Result<Vec<NewLicense>, CoreError> {
    let entries: Vec<NewLicense> = serde_json::from_str(json)
        .map_err(|e| CoreError::Validation(format!("Invalid license seed: {e}")))?;

    if let Some(blank) = entries.iter().find(|e| e.no.trim().is_empty()) {
        return Err(CoreError::Validation(format!(
            "License seed entry for '{}' has an empty number",
            blank.credentials.username
        )));
    }
    Ok(entries)
}

/// Insert every entry not already present. Returns how many were added.
pub async fn import_licenses(
    store: &dyn LicenseStore,
    entries: &[NewLicense],
) -> Result<usize, CoreError> {
    let mut inserted = 0;
    for entry in entries {
        match store.insert(entry).await? {
            Some(license) => {
                tracing::debug!(license_id = license.id, no = %license.no, "Seeded license");
                inserted += 1;
            }
            None => tracing::debug!(no = %entry.no, "License already present, not seeded"),
        }
    }
    Ok(inserted)
}

/// Read `path` and import its licenses.
pub async fn seed_from_file(store: &dyn LicenseStore, path: &Path) -> Result<usize, CoreError> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        CoreError::Internal(format!("Failed to read seed file {}: {e}", path.display()))
    })?;
    let entries = parse_seed(&json)?;
    let inserted = import_licenses(store, &entries).await?;
    tracing::info!(
        path = %path.display(),
        total = entries.len(),
        inserted,
        "License seed imported"
    );
    Ok(inserted)
}
