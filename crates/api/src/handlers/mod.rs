pub mod license;
pub mod usage_log;
