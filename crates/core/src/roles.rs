//! Well-known role name constants.
//!
//! Role names arrive in the bearer token claims; anything that is not
//! [`ROLE_ADMIN`] is treated as a regular user.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
