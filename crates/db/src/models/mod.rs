//! Row models mirroring the database tables.

pub mod license;
pub mod usage_log;
