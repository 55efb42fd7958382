use serde::Serialize;

use crate::{
    classifier::Dialect, codec, totp::Totp, uri_helper, OtpError, OtpHashAlgorithm,
    DEFAULT_DIGITS, DEFAULT_PERIOD,
};

/// `otpType` of an HOTP record
pub const OTP_TYPE_HOTP: u64 = 1;
/// `otpType` of a TOTP record, the only kind that becomes an [`Account`]
pub const OTP_TYPE_TOTP: u64 = 2;

/// Algorithm codes as carried by the migration export. Code 4 is the legacy
/// MD5 entry, which the generator does not support.
const ALGORITHM_TABLE: [(u64, OtpHashAlgorithm); 5] = [
    (0, OtpHashAlgorithm::SHA1),
    (1, OtpHashAlgorithm::SHA1),
    (2, OtpHashAlgorithm::SHA256),
    (3, OtpHashAlgorithm::SHA512),
    (4, OtpHashAlgorithm::SHA1),
];

const LEGACY_ALGORITHM_CODE: u64 = 4;

const DIGITS_TABLE: [(u64, u32); 3] = [(0, 6), (1, 6), (2, 8)];

/// Parameters of one account as found in a payload, before defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOtpParameter {
    pub secret_bytes: Vec<u8>,
    pub label: Option<String>,
    pub issuer: Option<String>,
    pub algorithm_code: u64,
    pub digits_code: u64,
    pub otp_type: u64,
    pub counter: Option<u64>,
    pub period: Option<u64>,
}

impl RawOtpParameter {
    pub fn is_totp(&self) -> bool {
        self.otp_type == OTP_TYPE_TOTP
    }
}

/// Maps an algorithm code to the hash used for generation.
///
/// Unknown codes and the legacy MD5 code resolve to SHA1.
pub fn resolve_algorithm(code: u64) -> OtpHashAlgorithm {
    if code == LEGACY_ALGORITHM_CODE {
        log::warn!("legacy MD5 algorithm requested, using SHA1");
    }

    ALGORITHM_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, algorithm)| *algorithm)
        .unwrap_or_else(|| {
            log::warn!("unknown algorithm code {code}, using SHA1");
            OtpHashAlgorithm::SHA1
        })
}

/// The code under which `algorithm` appears in [`resolve_algorithm`]'s table
pub fn algorithm_code(algorithm: OtpHashAlgorithm) -> u64 {
    match algorithm {
        OtpHashAlgorithm::SHA1 => 1,
        OtpHashAlgorithm::SHA256 => 2,
        OtpHashAlgorithm::SHA512 => 3,
    }
}

pub fn resolve_digits(code: u64) -> u32 {
    DIGITS_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, digits)| *digits)
        .unwrap_or_else(|| {
            log::warn!("unknown digit count code {code}, using {DEFAULT_DIGITS}");
            DEFAULT_DIGITS
        })
}

/// The code for a literal digit count; anything but 6 or 8 maps to unspecified.
pub fn digits_code(digits: u32) -> u64 {
    match digits {
        6 => 1,
        8 => 2,
        other => {
            log::warn!("unsupported digit count {other}, using {DEFAULT_DIGITS}");
            0
        }
    }
}

pub fn resolve_period(period: Option<u64>) -> u64 {
    match period {
        Some(0) => {
            log::warn!("period of 0 seconds, using {DEFAULT_PERIOD}");
            DEFAULT_PERIOD
        }
        Some(p) => p,
        None => DEFAULT_PERIOD,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub issuer: String,
    pub label: String,
    pub secret: String,
    pub algorithm: OtpHashAlgorithm,
    pub digits: u32,
    pub period: u64,
    pub current_code: String,
    pub provisioning_uri: String,
}

impl Account {
    /// Builds the canonical account for one parameter record and computes its
    /// code at `now`.
    ///
    /// The provisioning URI is rebuilt from the resolved fields, so both
    /// dialects end up with the same representation.
    pub fn normalize(raw: RawOtpParameter, now: u64) -> Result<Self, OtpError> {
        if raw.secret_bytes.is_empty() {
            return Err(OtpError::MissingSecret);
        }

        let mut totp = Totp::new(codec::base32_encode(&raw.secret_bytes));
        totp.with_algorithm(resolve_algorithm(raw.algorithm_code))
            .with_digits(resolve_digits(raw.digits_code))
            .with_period(resolve_period(raw.period));

        let issuer = raw.issuer.unwrap_or_default();
        let label = raw.label.unwrap_or_default();
        let provisioning_uri = uri_helper::otp_to_uri(&totp, &label, Some(issuer.as_str()))?;
        let current_code = totp.generate_or_sentinel(now).to_string();

        Ok(Self {
            issuer,
            label,
            secret: totp.secret,
            algorithm: totp.algorithm,
            digits: totp.digits,
            period: totp.period,
            current_code,
            provisioning_uri,
        })
    }

    pub fn totp(&self) -> Totp {
        let mut totp = Totp::new(self.secret.clone());
        totp.with_algorithm(self.algorithm)
            .with_digits(self.digits)
            .with_period(self.period);

        totp
    }

    /// Overwrites `current_code` with the code for `now`
    pub fn refresh(&mut self, now: u64) {
        self.current_code = self.totp().generate_or_sentinel(now).to_string();
    }

    pub fn time_left(&self, now: u64) -> u64 {
        self.totp().remaining_seconds(now)
    }

    /// The issuer as shown to a user; empty issuers read as "unknown"
    pub fn display_issuer(&self) -> &str {
        if self.issuer.is_empty() {
            "unknown"
        } else {
            &self.issuer
        }
    }
}

/// The accounts found in one QR payload, in payload order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodingResult {
    pub dialect: Dialect,
    pub accounts: Vec<Account>,
}
