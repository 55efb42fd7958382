use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::{
    account::{self, RawOtpParameter, OTP_TYPE_TOTP},
    totp::Totp,
    OtpError, OtpHashAlgorithm,
};

const TOTP_TYPE: &str = "totp";

const URI_SECRET_QUERY: &str = "secret";
const URI_ISSUER_QUERY: &str = "issuer";
const URI_HASH_QUERY: &str = "algorithm";
const URI_PERIOD_QUERY: &str = "period";
const URI_DIGITS_QUERY: &str = "digits";

/// Characters escaped inside one half of an `issuer:label` path
const LABEL_PART: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn decode_label_part(part: &str) -> String {
    percent_decode_str(part).decode_utf8_lossy().into_owned()
}

/// Parses a single-account `otpauth://totp/` URI into raw parameters.
pub fn otp_from_uri(uri: &str) -> Result<RawOtpParameter, OtpError> {
    let uri = url::Url::parse(uri).map_err(OtpError::UriParseError)?;

    let host = uri.host_str();
    if host != Some(TOTP_TYPE) {
        return Err(OtpError::InvalidUriType(
            host.unwrap_or("None").into(),
            TOTP_TYPE.into(),
        ));
    }

    let path = uri.path().strip_prefix('/').unwrap_or(uri.path());
    let (mut issuer, label) = match path.split_once(':') {
        Some((issuer, label)) => (Some(decode_label_part(issuer)), decode_label_part(label)),
        None => (None, decode_label_part(path)),
    };

    let mut secret = "".to_string();
    let mut algorithm = OtpHashAlgorithm::default();
    let mut period = None;
    let mut digits = None;

    for (key, value) in uri.query_pairs() {
        match key.as_ref() {
            URI_SECRET_QUERY => secret = value.into_owned(),
            URI_ISSUER_QUERY if !value.is_empty() => issuer = Some(value.into_owned()),
            URI_HASH_QUERY => algorithm = OtpHashAlgorithm::resolve_name(value.as_ref()),
            URI_PERIOD_QUERY => {
                period = Some(
                    u64::from_str(value.as_ref())
                        .map_err(|e| OtpError::IntegerParseError(e, URI_PERIOD_QUERY.into()))?,
                )
            }
            URI_DIGITS_QUERY => {
                digits = Some(
                    u32::from_str(value.as_ref())
                        .map_err(|e| OtpError::IntegerParseError(e, URI_DIGITS_QUERY.into()))?,
                )
            }
            _ => (),
        }
    }

    if secret.is_empty() {
        return Err(OtpError::MissingSecret);
    }

    let secret_bytes = Totp::new(secret).decode_secret()?;
    if secret_bytes.is_empty() {
        return Err(OtpError::MissingSecret);
    }

    Ok(RawOtpParameter {
        secret_bytes,
        label: Some(label),
        issuer,
        algorithm_code: account::algorithm_code(algorithm),
        digits_code: digits.map_or(0, account::digits_code),
        otp_type: OTP_TYPE_TOTP,
        counter: None,
        period,
    })
}

/// Builds the canonical `otpauth://totp/` URI for a resolved account.
///
/// The issuer is left out of both the path and the query when empty.
pub fn otp_to_uri(totp: &Totp, user: &str, issuer: Option<&str>) -> Result<String, OtpError> {
    let mut uri =
        url::Url::parse(&format!("otpauth://{TOTP_TYPE}/")).map_err(OtpError::UriParseError)?;

    let issuer = issuer.filter(|i| !i.is_empty());
    let user_part = utf8_percent_encode(user, LABEL_PART);

    match issuer {
        Some(issuer) => uri.set_path(&format!(
            "/{}:{}",
            utf8_percent_encode(issuer, LABEL_PART),
            user_part
        )),
        None => uri.set_path(&format!("/{user_part}")),
    }

    {
        let mut query_params = uri.query_pairs_mut();

        query_params.append_pair(URI_SECRET_QUERY, &totp.secret);

        if let Some(issuer) = issuer {
            query_params.append_pair(URI_ISSUER_QUERY, issuer);
        }

        query_params
            .append_pair(URI_HASH_QUERY, &totp.algorithm.to_string())
            .append_pair(URI_DIGITS_QUERY, &totp.digits.to_string())
            .append_pair(URI_PERIOD_QUERY, &totp.period.to_string());
    }

    Ok(uri.to_string())
}
