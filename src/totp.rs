use hmac::{digest::KeyInit, Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::{codec, OtpCode, OtpError, OtpHashAlgorithm, DEFAULT_DIGITS, DEFAULT_PERIOD};

#[derive(Debug, Clone, PartialEq)]
pub struct Totp {
    pub(crate) secret: String,
    pub(crate) algorithm: OtpHashAlgorithm,
    pub(crate) period: u64,
    pub(crate) digits: u32,
}

impl Totp {
    /// Creates the config for the [Time-based One-time Password Algorithm](http://en.wikipedia.org/wiki/Time-based_One-time_Password_Algorithm)
    /// (TOTP) given an RFC4648 base32 encoded secret.
    ///
    /// Obs.: This method defaults to the SHA1 hash, a 6-digit code and a period of 30 seconds
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            algorithm: OtpHashAlgorithm::SHA1,
            period: DEFAULT_PERIOD,
            digits: DEFAULT_DIGITS,
        }
    }

    ///  Sets hashing algorithm
    pub fn with_algorithm(&mut self, algorithm: OtpHashAlgorithm) -> &mut Self {
        self.algorithm = algorithm;

        self
    }

    ///  Sets the period in seconds
    pub fn with_period(&mut self, period: u64) -> &mut Self {
        self.period = period;

        self
    }

    ///  Sets the number of digits to generate
    pub fn with_digits(&mut self, digits: u32) -> &mut Self {
        self.digits = digits;

        self
    }

    /// Decodes the secret into raw key bytes.
    ///
    /// Lowercase symbols, `=` padding and whitespace are tolerated here since
    /// secrets are often typed or copied by hand.
    pub fn decode_secret(&self) -> Result<Vec<u8>, OtpError> {
        let normalized: String = self
            .secret
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        codec::base32_decode(&normalized).map_err(OtpError::SecretDecode)
    }

    /// Seconds until the current window ends, in `1..=period`
    pub fn remaining_seconds(&self, seconds_since_epoch: u64) -> u64 {
        let period = self.period.max(1);
        period - seconds_since_epoch % period
    }

    /// Generates a Totp from the provided seconds since the UNIX epoch
    /// truncated to the specified number of digits
    pub fn generate(&self, seconds_since_epoch: u64) -> Result<OtpCode, OtpError> {
        if self.period == 0 {
            return Err(OtpError::ZeroPeriod);
        }
        let truncation_factor = truncation_factor(self.digits)?;
        let calculated_time = seconds_since_epoch / self.period;

        let decoded = self.decode_secret()?;
        let digest = calc_digest(decoded.as_slice(), self.algorithm, calculated_time)?;

        let code = encode_digest_truncated(digest.as_ref(), truncation_factor)?;

        Ok(OtpCode {
            code,
            digits: self.digits,
        })
    }

    /// Generates the code for the given instant, never failing.
    ///
    /// Any error is logged and replaced by the all-zero code of the
    /// configured length, or of the default length when the configured one
    /// cannot be rendered.
    pub fn generate_or_sentinel(&self, seconds_since_epoch: u64) -> OtpCode {
        self.generate(seconds_since_epoch).unwrap_or_else(|e| {
            log::warn!(
                "TOTP generation failed ({e}); algorithm={} digits={} period={}",
                self.algorithm,
                self.digits,
                self.period
            );
            match e {
                OtpError::UnsupportedDigits(_) => OtpCode::sentinel(DEFAULT_DIGITS),
                _ => OtpCode::sentinel(self.digits),
            }
        })
    }
}

/// Renders the current code for a secret as a zero-padded decimal string.
///
/// This never fails: a bad secret yields `"0"` repeated `digits` times, and a
/// `digits` of 0 or above 19 yields the six-digit all-zero code.
pub fn generate_code(
    secret: &str,
    algorithm: OtpHashAlgorithm,
    digits: u32,
    period: u64,
    seconds_since_epoch: u64,
) -> String {
    let mut totp = Totp::new(secret.to_string());
    totp.with_algorithm(algorithm)
        .with_digits(digits)
        .with_period(period);

    totp.generate_or_sentinel(seconds_since_epoch).to_string()
}

// HMAC pads or hashes keys of any length, so `new_from_slice` only fails for
// fixed-key MACs. The error is still mapped rather than unwrapped.
fn hmac_digest<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, OtpError> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| OtpError::InvalidKeyLength)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Calculates the HMAC digest of the big-endian counter.
fn calc_digest(
    decoded_secret: &[u8],
    algorithm: OtpHashAlgorithm,
    data: u64,
) -> Result<Vec<u8>, OtpError> {
    let data = data.to_be_bytes();

    match algorithm {
        OtpHashAlgorithm::SHA1 => hmac_digest::<Hmac<Sha1>>(decoded_secret, &data),
        OtpHashAlgorithm::SHA256 => hmac_digest::<Hmac<Sha256>>(decoded_secret, &data),
        OtpHashAlgorithm::SHA512 => hmac_digest::<Hmac<Sha512>>(decoded_secret, &data),
    }
}

/// `10^digits`, for code lengths a `u64` modulus can express.
fn truncation_factor(digits: u32) -> Result<u64, OtpError> {
    if digits == 0 {
        return Err(OtpError::UnsupportedDigits(digits));
    }

    10u64
        .checked_pow(digits)
        .ok_or(OtpError::UnsupportedDigits(digits))
}

/// Encodes the HMAC digest into a truncated integer.
pub(crate) fn encode_digest_truncated(
    digest: &[u8],
    truncation_factor: u64,
) -> Result<u32, OtpError> {
    // While sometimes this is a hardcoded 19
    // the last byte tells us the offset for any algorithm
    let offset = match digest.last() {
        Some(x) => *x & 0xf,
        None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
    } as usize;

    // Gets the 4 bytes that will compose the code
    let code_bytes: [u8; 4] = match digest.get(offset..offset + 4).map(<[u8; 4]>::try_from) {
        Some(Ok(x)) => x,
        _ => return Err(OtpError::InvalidDigest(Vec::from(digest))),
    };

    let code = u32::from_be_bytes(code_bytes) & 0x7fffffff;
    let truncated = u64::from(code) % truncation_factor;

    // Never larger than the 31-bit code it was reduced from
    Ok(truncated as u32)
}
