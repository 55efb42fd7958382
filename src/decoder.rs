use crate::{
    account::{Account, DecodingResult, RawOtpParameter},
    classifier::{classify, Dialect},
    migration, uri_helper, OtpError,
};

/// Raw image samples as handed over by whatever loaded the picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, four bytes per pixel
    pub pixels: Vec<u8>,
}

/// Finds a QR symbol in an image and returns its text.
pub trait QrReader {
    fn read(&self, image: &ImageSample) -> Option<String>;
}

impl<F> QrReader for F
where
    F: Fn(&ImageSample) -> Option<String>,
{
    fn read(&self, image: &ImageSample) -> Option<String> {
        self(image)
    }
}

/// Decodes a QR payload string into accounts whose codes are current at `now`.
///
/// Either every account of the payload is returned or a single error is.
pub fn decode_payload(payload: &str, now: u64) -> Result<DecodingResult, OtpError> {
    let dialect = classify(payload)?;
    log::debug!("payload classified as {dialect:?}");

    let parameters: Vec<RawOtpParameter> = match dialect {
        Dialect::Standard => vec![uri_helper::otp_from_uri(payload)?],
        Dialect::Migration => migration::otp_from_migration_uri(payload)?,
    };

    let accounts = parameters
        .into_iter()
        .map(|raw| Account::normalize(raw, now))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodingResult { dialect, accounts })
}

/// Reads the QR symbol of an image with `reader`, then decodes its payload.
pub fn decode_image<R: QrReader + ?Sized>(
    reader: &R,
    image: &ImageSample,
    now: u64,
) -> Result<DecodingResult, OtpError> {
    let payload = reader.read(image).ok_or(OtpError::NoQrFound)?;

    decode_payload(&payload, now)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::{decode_image, decode_payload, ImageSample};
    use crate::{
        account::{OTP_TYPE_HOTP, OTP_TYPE_TOTP},
        migration::tests::{migration_uri, record},
        Dialect, OtpError, OtpHashAlgorithm,
    };

    #[fixture]
    fn image() -> ImageSample {
        ImageSample {
            width: 1,
            height: 1,
            pixels: vec![0, 0, 0, 255],
        }
    }

    #[test]
    fn standard_payload_yields_one_account() {
        let result = decode_payload(
            "otpauth://totp/Test:alice?secret=JBSWY3DPEHPK3PXP&issuer=Test&algorithm=SHA256&digits=8&period=60",
            59,
        )
        .unwrap();

        assert_eq!(Dialect::Standard, result.dialect);
        assert_eq!(1, result.accounts.len());

        let account = &result.accounts[0];
        assert_eq!("Test", account.issuer);
        assert_eq!("alice", account.label);
        assert_eq!(OtpHashAlgorithm::SHA256, account.algorithm);
        assert_eq!(8, account.digits);
        assert_eq!(60, account.period);
        assert_eq!(8, account.current_code.len());
    }

    #[test]
    fn migration_payload_keeps_record_order() {
        let uri = migration_uri(&[
            record(b"first-secret", "one", "A", 3, 2, OTP_TYPE_TOTP),
            record(b"skipped", "hotp", "B", 1, 1, OTP_TYPE_HOTP),
            record(b"second-secret", "two", "C", 4, 0, OTP_TYPE_TOTP),
        ]);

        let result = decode_payload(&uri, 0).unwrap();

        assert_eq!(Dialect::Migration, result.dialect);
        let summary: Vec<_> = result
            .accounts
            .iter()
            .map(|a| (a.label.as_str(), a.algorithm, a.digits, a.period))
            .collect();
        assert_eq!(
            vec![
                ("one", OtpHashAlgorithm::SHA512, 8, 30),
                ("two", OtpHashAlgorithm::SHA1, 6, 30),
            ],
            summary
        );
    }

    #[test]
    fn both_dialects_share_the_canonical_uri() {
        let standard = decode_payload(
            "otpauth://totp/ACME:alice?secret=JBSWY3DPEHPK3PXP&algorithm=SHA-1",
            0,
        )
        .unwrap();
        let migration = decode_payload(
            &migration_uri(&[record(b"Hello!\xde\xad\xbe\xef", "alice", "ACME", 1, 1, OTP_TYPE_TOTP)]),
            0,
        )
        .unwrap();

        assert_eq!(standard.accounts, migration.accounts);
    }

    #[rstest]
    #[case("http://example.com")]
    #[case("otpauth://hotp/alice?secret=JBSWY3DPEHPK3PXP&counter=0")]
    fn unsupported_format(#[case] payload: &str) {
        assert!(matches!(
            decode_payload(payload, 0),
            Err(OtpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn malformed_migration_aborts_batch() {
        let uri = "otpauth-migration://offline?data=CgUB";

        assert!(matches!(
            decode_payload(uri, 0),
            Err(OtpError::MalformedBinaryPayload(_))
        ));
    }

    #[rstest]
    fn image_without_symbol(image: ImageSample) {
        let reader = |_: &ImageSample| -> Option<String> { None };

        assert!(matches!(
            decode_image(&reader, &image, 0),
            Err(OtpError::NoQrFound)
        ));
    }

    #[rstest]
    fn image_with_symbol(image: ImageSample) {
        let reader =
            |_: &ImageSample| Some("otpauth://totp/alice?secret=JBSWY3DPEHPK3PXP".to_string());

        let result = decode_image(&reader, &image, 0).unwrap();
        assert_eq!(1, result.accounts.len());
        assert_eq!("", result.accounts[0].issuer);
    }
}
