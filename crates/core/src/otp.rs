//! One-time codes for shared accounts.
//!
//! Codes are neither generated nor stored here. An [`OtpSource`] is queried
//! with a key derived from the license sequence number (`"license7"` for
//! seat `"7"` or `"07"`).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Prefix of every OTP lookup key.
pub const OTP_KEY_PREFIX: &str = "license";

/// The most recent one-time code delivered to a shared account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpCode {
    pub code: String,
    /// When the code was issued, as reported by the source.
    pub issued_at: Option<String>,
}

/// Derive the OTP lookup key for a license sequence number.
///
/// Leading zeros are dropped so `"07"` and `"7"` map to the same mailbox.
pub fn otp_key(license_no: &str) -> Result<String, CoreError> {
    let n: u32 = license_no.trim().parse().map_err(|_| {
        CoreError::Validation(format!(
            "License number '{license_no}' is not numeric, no OTP mailbox is mapped"
        ))
    })?;
    Ok(format!("{OTP_KEY_PREFIX}{n}"))
}

#[async_trait]
pub trait OtpSource: Send + Sync {
    /// Latest code for `key`, or `None` when no code has arrived yet.
    async fn lookup(&self, key: &str) -> Result<Option<OtpCode>, CoreError>;
}

/// Fixed codes held in memory. Used for local development and tests.
#[derive(Debug, Default)]
pub struct StaticOtpSource {
    codes: RwLock<HashMap<String, OtpCode>>,
}

impl StaticOtpSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, code: OtpCode) {
        self.codes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), code);
    }
}

#[async_trait]
impl OtpSource for StaticOtpSource {
    async fn lookup(&self, key: &str) -> Result<Option<OtpCode>, CoreError> {
        Ok(self
            .codes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}
