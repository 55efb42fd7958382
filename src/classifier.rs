use serde::Serialize;

use crate::OtpError;

/// Every single-account payload starts with this literal
pub const STANDARD_PREFIX: &str = "otpauth://totp/";
/// Every migration export starts with this literal
pub const MIGRATION_PREFIX: &str = "otpauth-migration://offline?data=";

/// How much of a rejected payload is echoed back in the error
const PREVIEW_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Standard,
    Migration,
}

/// Detects the payload dialect by its literal prefix.
///
/// Nothing beyond the two prefixes is recognised, so `otpauth://hotp/` and
/// any other scheme are rejected.
pub fn classify(payload: &str) -> Result<Dialect, OtpError> {
    if payload.starts_with(STANDARD_PREFIX) {
        Ok(Dialect::Standard)
    } else if payload.starts_with(MIGRATION_PREFIX) {
        Ok(Dialect::Migration)
    } else {
        Err(OtpError::UnsupportedFormat(
            payload.chars().take(PREVIEW_LEN).collect(),
        ))
    }
}
