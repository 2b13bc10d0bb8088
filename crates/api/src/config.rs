use std::path::PathBuf;

use chrono::Duration;
use seatpool_core::license::{LeasePolicy, DEFAULT_ACTIVE_MINUTES, DEFAULT_EXTEND_WINDOW_MINUTES};

use crate::auth::jwt::JwtConfig;

/// Default interval between expiry sweeps, in seconds.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT validation settings.
    pub jwt: JwtConfig,
    /// Postgres URL. `None` runs on in-memory stores.
    pub database_url: Option<String>,
    /// Activation length and extension window.
    pub lease: LeasePolicy,
    /// Seconds between expiry sweeps. `0` disables the periodic sweep.
    pub sweep_interval_secs: u64,
    /// Base URL of the OTP mailbox service.
    pub otp_service_url: Option<String>,
    /// JSON file of licenses to import at startup.
    pub seed_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `HOST`                          | `0.0.0.0`               |
    /// | `PORT`                          | `3000`                  |
    /// | `CORS_ORIGINS`                  | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                    |
    /// | `DATABASE_URL`                  | unset (in-memory)       |
    /// | `LICENSE_ACTIVE_MINUTES`        | `120`                   |
    /// | `LICENSE_EXTEND_WINDOW_MINUTES` | `15`                    |
    /// | `SWEEP_INTERVAL_SECS`           | `60`                    |
    /// | `OTP_SERVICE_URL`               | unset                   |
    /// | `LICENSE_SEED_FILE`             | unset                   |
    ///
    /// See [`JwtConfig::from_env`] for the token settings.
    ///
    /// # Panics
    ///
    /// Panics on unparsable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let active_minutes: i64 = std::env::var("LICENSE_ACTIVE_MINUTES")
            .unwrap_or_else(|_| DEFAULT_ACTIVE_MINUTES.to_string())
            .parse()
            .expect("LICENSE_ACTIVE_MINUTES must be a valid i64");
        assert!(active_minutes > 0, "LICENSE_ACTIVE_MINUTES must be positive");

        let extend_window_minutes: i64 = std::env::var("LICENSE_EXTEND_WINDOW_MINUTES")
            .unwrap_or_else(|_| DEFAULT_EXTEND_WINDOW_MINUTES.to_string())
            .parse()
            .expect("LICENSE_EXTEND_WINDOW_MINUTES must be a valid i64");
        assert!(
            extend_window_minutes >= 0,
            "LICENSE_EXTEND_WINDOW_MINUTES must not be negative"
        );

        let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .expect("SWEEP_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            database_url: non_empty_var("DATABASE_URL"),
            lease: LeasePolicy {
                active_duration: Duration::minutes(active_minutes),
                extend_window: Duration::minutes(extend_window_minutes),
            },
            sweep_interval_secs,
            otp_service_url: non_empty_var("OTP_SERVICE_URL"),
            seed_file: non_empty_var("LICENSE_SEED_FILE").map(PathBuf::from),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
