//! Seatpool domain core.
//!
//! Holds the license state machine, the lease coordinator that serializes
//! transitions per license, the storage and OTP collaborator traits, and the
//! usage log types shared by the storage and API crates.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod license;
pub mod otp;
pub mod roles;
pub mod store;
pub mod types;
pub mod usage;
