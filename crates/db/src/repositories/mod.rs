//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument. The `Pg*Store` types adapt
//! them to the storage traits in `seatpool-core`.

pub mod license_repo;
pub mod usage_log_repo;

pub use license_repo::{LicenseRepo, PgLicenseStore};
pub use usage_log_repo::{PgUsageLogStore, UsageLogRepo};
