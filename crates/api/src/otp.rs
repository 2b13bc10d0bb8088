//! HTTP client for the OTP mailbox service.
//!
//! The service reads the shared account's inbox and answers
//! `GET /otp/get?license_id=<key>` with the newest code it found, or with a
//! body lacking `otp` when there is none yet.

use std::time::Duration;

use async_trait::async_trait;
use seatpool_core::error::CoreError;
use seatpool_core::otp::{OtpCode, OtpSource};
use serde::Deserialize;

/// Upper bound on a single mailbox lookup.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct OtpServiceResponse {
    otp: Option<String>,
    date: Option<String>,
}

/// [`OtpSource`] backed by the OTP mailbox service.
#[derive(Debug, Clone)]
pub struct HttpOtpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOtpSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to build OTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl OtpSource for HttpOtpSource {
    async fn lookup(&self, key: &str) -> Result<Option<OtpCode>, CoreError> {
        let url = format!("{}/otp/get", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("license_id", key)])
            .send()
            .await
            .map_err(|e| CoreError::Upstream(format!("OTP service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Upstream(format!(
                "OTP service returned {status} for {key}"
            )));
        }

        let body: OtpServiceResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Upstream(format!("Malformed OTP service response: {e}")))?;

        Ok(body.otp.map(|code| OtpCode {
            code,
            issued_at: body.date,
        }))
    }
}
