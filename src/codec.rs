//! Byte transforms shared by the payload decoders and the generator.
//!
//! Base32 follows RFC 4648 with the uppercase `A-Z2-7` alphabet and no `=`
//! padding in either direction. Base64 is only used for the migration
//! envelope and never for secret material.

use std::sync::OnceLock;

use data_encoding::{DecodeError, DecodeKind, Encoding, SpecificationError};

use crate::OtpError;

/// A varint never spans more than this many bytes for a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

const BASE32_SYMBOLS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn without_trailing_bit_check(
    cell: &'static OnceLock<Result<Encoding, SpecificationError>>,
    base: &Encoding,
) -> Result<&'static Encoding, String> {
    cell.get_or_init(|| {
        let mut spec = base.specification();
        spec.check_trailing_bits = false;
        spec.encoding()
    })
    .as_ref()
    .map_err(|e| e.to_string())
}

fn base32_encoding() -> Result<&'static Encoding, DecodeError> {
    static CELL: OnceLock<Result<Encoding, SpecificationError>> = OnceLock::new();
    without_trailing_bit_check(&CELL, &data_encoding::BASE32_NOPAD).map_err(|e| {
        log::error!("base32 specification rejected: {e}");
        DecodeError {
            position: 0,
            kind: DecodeKind::Symbol,
        }
    })
}

fn base64_encoding() -> Result<&'static Encoding, DecodeError> {
    static CELL: OnceLock<Result<Encoding, SpecificationError>> = OnceLock::new();
    without_trailing_bit_check(&CELL, &data_encoding::BASE64_NOPAD).map_err(|e| {
        log::error!("base64 specification rejected: {e}");
        DecodeError {
            position: 0,
            kind: DecodeKind::Symbol,
        }
    })
}

/// Encodes bytes as unpadded uppercase base32.
///
/// A final group of fewer than 5 bits is padded with zero bits into one more
/// symbol, so `n` bytes always yield `ceil(8n / 5)` symbols.
pub fn base32_encode(bytes: &[u8]) -> String {
    data_encoding::BASE32_NOPAD.encode(bytes)
}

/// Decodes unpadded uppercase base32.
///
/// Every symbol must belong to the alphabet. Leftover bits that do not fill a
/// whole byte are dropped, so inputs of any length decode.
pub fn base32_decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = input.as_bytes();

    if let Some(position) = bytes.iter().position(|b| !BASE32_SYMBOLS.contains(b)) {
        return Err(DecodeError {
            position,
            kind: DecodeKind::Symbol,
        });
    }

    // A trailing symbol at these lengths carries no full byte
    let usable = match bytes.len() % 8 {
        1 | 3 | 6 => bytes.len() - 1,
        _ => bytes.len(),
    };

    base32_encoding()?.decode(&bytes[..usable])
}

/// Decodes standard base64, padded or not.
///
/// Form decoding of a query string turns a literal `+` into a space, so
/// spaces are read back as `+` before anything is trimmed. Only line breaks
/// and tabs around the data are ignored.
pub fn base64_decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let restored: String = input
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();
    let restored = restored
        .trim_matches(|c| matches!(c, '\r' | '\n' | '\t'))
        .trim_end_matches('=');

    base64_encoding()?.decode(restored.as_bytes())
}

/// Decodes a little-endian base-128 varint starting at `offset`.
///
/// Returns the value and the number of bytes consumed.
pub fn varint_decode(bytes: &[u8], offset: usize) -> Result<(u64, usize), OtpError> {
    let mut value: u64 = 0;

    for index in 0..MAX_VARINT_LEN {
        let byte = *bytes.get(offset + index).ok_or_else(|| {
            OtpError::MalformedBinaryPayload(format!("varint at offset {offset} is truncated"))
        })?;

        let part = u64::from(byte & 0x7f);
        if index == MAX_VARINT_LEN - 1 && part > 1 {
            return Err(OtpError::MalformedBinaryPayload(format!(
                "varint at offset {offset} overflows 64 bits"
            )));
        }
        value |= part << (7 * index);

        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }

    Err(OtpError::MalformedBinaryPayload(format!(
        "varint at offset {offset} is longer than {MAX_VARINT_LEN} bytes"
    )))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{base32_decode, base32_encode, base64_decode, varint_decode};
    use crate::OtpError;

    #[rstest]
    #[case(b"", "")]
    #[case(b"f", "MY")]
    #[case(b"fo", "MZXQ")]
    #[case(b"foo", "MZXW6")]
    #[case(b"foob", "MZXW6YQ")]
    #[case(b"fooba", "MZXW6YTB")]
    #[case(b"foobar", "MZXW6YTBOI")]
    #[case(b"Hello!\xde\xad\xbe\xef", "JBSWY3DPEHPK3PXP")]
    fn base32_rfc4648_vectors(#[case] bytes: &[u8], #[case] encoded: &str) {
        assert_eq!(encoded, base32_encode(bytes));
        assert_eq!(bytes, base32_decode(encoded).unwrap().as_slice());
    }

    #[test]
    fn base32_round_trips_every_length() {
        let data: Vec<u8> = (0..=64u8).map(|b| b.wrapping_mul(37)).collect();

        for len in 0..data.len() {
            let encoded = base32_encode(&data[..len]);
            assert!(!encoded.contains('='));
            assert_eq!(&data[..len], base32_decode(&encoded).unwrap().as_slice());
        }
    }

    #[rstest]
    #[case("MZXW6===")]
    #[case("mzxw6")]
    #[case("MZXW1")]
    fn base32_rejects_foreign_symbols(#[case] input: &str) {
        assert!(base32_decode(input).is_err());
    }

    #[rstest]
    #[case("M", b"")]
    #[case("MZX", b"f")]
    #[case("MZXW6Y", b"foo")]
    fn base32_drops_incomplete_trailing_bits(#[case] input: &str, #[case] expected: &[u8]) {
        assert_eq!(expected, base32_decode(input).unwrap().as_slice());
    }

    #[rstest]
    #[case("Zm9vYmFy", b"foobar")]
    #[case("Zm9vYg==", b"foob")]
    #[case("Zm9vYg", b"foob")]
    #[case("+/8=", b"\xfb\xff")]
    #[case(" /8=", b"\xfb\xff")]
    #[case("Zm9v    ", b"foo\xfb\xef\xbe")]
    #[case("/+8+", b"\xff\xef\x3e")]
    #[case("/ 8 ", b"\xff\xef\x3e")]
    #[case("Zm9vYmFy\r\n", b"foobar")]
    fn base64_decode_test(#[case] input: &str, #[case] expected: &[u8]) {
        assert_eq!(expected, base64_decode(input).unwrap().as_slice());
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(base64_decode("not*base64").is_err());
    }

    #[rstest]
    #[case(&[0x00], 0, 1)]
    #[case(&[0x01], 1, 1)]
    #[case(&[0x7f], 127, 1)]
    #[case(&[0x96, 0x01], 150, 2)]
    #[case(&[0xac, 0x02, 0xff], 300, 2)]
    #[case(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01], u64::MAX, 10)]
    fn varint_decode_test(#[case] bytes: &[u8], #[case] value: u64, #[case] consumed: usize) {
        assert_eq!((value, consumed), varint_decode(bytes, 0).unwrap());
    }

    #[test]
    fn varint_decode_honours_offset() {
        assert_eq!((150, 2), varint_decode(&[0x08, 0x96, 0x01], 1).unwrap());
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x80])]
    #[case(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02])]
    #[case(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01])]
    fn varint_decode_rejects_malformed(#[case] bytes: &[u8]) {
        assert!(matches!(
            varint_decode(bytes, 0),
            Err(OtpError::MalformedBinaryPayload(_))
        ));
    }
}
