pub mod account;
pub mod classifier;
pub mod codec;
pub mod decoder;
pub mod migration;
pub mod scheduler;
pub mod totp;
pub(crate) mod uri_helper;

use core::num;
use std::{fmt::Display, str::FromStr};

pub use account::{Account, DecodingResult, RawOtpParameter};
pub use classifier::{classify, Dialect};
pub use decoder::{decode_image, decode_payload, ImageSample, QrReader};
pub use scheduler::{Generation, RefreshScheduler, SchedulerConfig, TickOutcome};
pub use totp::{generate_code, Totp};

/// Seconds per window when a payload does not say otherwise
pub const DEFAULT_PERIOD: u64 = 30;
/// Code length when a payload does not say otherwise
pub const DEFAULT_DIGITS: u32 = 6;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("No QR code found in image")]
    NoQrFound,
    #[error("Unsupported QR code format, found: {0}")]
    UnsupportedFormat(String),
    #[error("Could not parse the URI")]
    UriParseError(url::ParseError),
    #[error("Secret not found")]
    MissingSecret,
    #[error("No data parameter in migration URI")]
    MissingDataParameter,
    #[error("Could not decode the migration envelope")]
    EnvelopeDecode(data_encoding::DecodeError),
    #[error("Secret decode error")]
    SecretDecode(data_encoding::DecodeError),
    #[error("Malformed migration payload: {0}")]
    MalformedBinaryPayload(String),
    /// Not produced for HMAC, which accepts keys of any length; kept for the
    /// fallible `KeyInit` contract.
    #[error("HMAC key has an invalid length")]
    InvalidKeyLength,
    #[error("Period must be greater than zero")]
    ZeroPeriod,
    #[error("Cannot render a code of {0} digits")]
    UnsupportedDigits(u32),
    #[error("Invalid digest")]
    InvalidDigest(Vec<u8>),
    #[error("The provided URI is not valid, found {0}. Expected: {1}")]
    InvalidUriType(String, String),
    #[error("Could not parse an integer. Failed parsing: {1}")]
    IntegerParseError(num::ParseIntError, String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OtpHashAlgorithm {
    #[default]
    SHA1,
    SHA256,
    SHA512,
}

impl OtpHashAlgorithm {
    /// Resolves an algorithm name, falling back to SHA1 for anything unsupported.
    ///
    /// Both the bare (`SHA256`) and hyphenated (`SHA-256`) spellings are accepted.
    pub fn resolve_name(name: &str) -> Self {
        Self::from_str(name).unwrap_or_else(|_| {
            log::warn!("unsupported hash algorithm {name:?}, using SHA1");
            Self::SHA1
        })
    }
}

impl Display for OtpHashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SHA1 => write!(f, "SHA1"),
            Self::SHA256 => write!(f, "SHA256"),
            Self::SHA512 => write!(f, "SHA512"),
        }
    }
}

/// An algorithm name other than SHA1, SHA256 or SHA512.
/// [`OtpHashAlgorithm::resolve_name`] maps it to SHA1 instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedHashAlgorithm(pub String);

impl FromStr for OtpHashAlgorithm {
    type Err = UnsupportedHashAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "");

        match normalized.as_str() {
            "SHA1" => Ok(Self::SHA1),
            "SHA256" => Ok(Self::SHA256),
            "SHA512" => Ok(Self::SHA512),
            _ => Err(UnsupportedHashAlgorithm(s.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OtpCode {
    code: u32,
    digits: u32,
}

impl OtpCode {
    pub fn integer(&self) -> u32 {
        self.code
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// The all-zero code shown when generation fails
    pub fn sentinel(digits: u32) -> Self {
        Self { code: 0, digits }
    }
}

impl Display for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0padding$}",
            self.code,
            padding = (self.digits as usize)
        )
    }
}
