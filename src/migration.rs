//! Decoder for the `otpauth-migration://offline?data=` export.
//!
//! The `data` parameter is base64 over a protobuf message:
//!
//! ```text
//! MigrationPayload {
//!     repeated OtpParameters otp_parameters = 1;
//!     int32 version = 2; int32 batch_size = 3; int32 batch_index = 4; int32 batch_id = 5;
//! }
//! OtpParameters {
//!     bytes secret = 1; string name = 2; string issuer = 3;
//!     Algorithm algorithm = 4; DigitCount digits = 5; OtpType type = 6; int64 counter = 7;
//! }
//! ```
//!
//! There is no period field; accounts from this dialect always use the default.

use crate::{
    account::RawOtpParameter,
    codec::{self, varint_decode},
    OtpError,
};

const DATA_QUERY: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl TryFrom<u64> for WireType {
    type Error = OtpError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(OtpError::MalformedBinaryPayload(format!(
                "unsupported wire type {other}"
            ))),
        }
    }
}

/// A field value as read off the wire
enum FieldValue<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn varint(&mut self) -> Result<u64, OtpError> {
        let (value, consumed) = varint_decode(self.data, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], OtpError> {
        if self.remaining() < n {
            return Err(OtpError::MalformedBinaryPayload(format!(
                "field at offset {} wants {n} bytes, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    /// Reads one tag and its value, returning the field number alongside it.
    fn field(&mut self) -> Result<(u64, FieldValue<'a>), OtpError> {
        let tag = self.varint()?;
        let number = tag >> 3;
        if number == 0 {
            return Err(OtpError::MalformedBinaryPayload(format!(
                "field number 0 before offset {}",
                self.pos
            )));
        }

        let value = match WireType::try_from(tag & 0x7)? {
            WireType::Varint => FieldValue::Varint(self.varint()?),
            WireType::LengthDelimited => {
                let len = self.varint()?;
                let len = usize::try_from(len).map_err(|_| {
                    OtpError::MalformedBinaryPayload(format!("length {len} does not fit memory"))
                })?;
                FieldValue::Bytes(self.read_bytes(len)?)
            }
            WireType::Fixed64 => {
                self.read_bytes(8)?;
                FieldValue::Fixed
            }
            WireType::Fixed32 => {
                self.read_bytes(4)?;
                FieldValue::Fixed
            }
        };

        Ok((number, value))
    }
}

/// Every record of one export, plus the batch bookkeeping fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationBatch {
    pub parameters: Vec<RawOtpParameter>,
    pub version: Option<u64>,
    pub batch_size: Option<u64>,
    pub batch_index: Option<u64>,
    pub batch_id: Option<u64>,
}

fn mismatched(message: &str, number: u64) -> OtpError {
    OtpError::MalformedBinaryPayload(format!("{message} field {number} has the wrong wire type"))
}

fn decode_parameter(bytes: &[u8]) -> Result<RawOtpParameter, OtpError> {
    let mut cursor = Cursor::new(bytes);
    let mut parameter = RawOtpParameter::default();

    while !cursor.is_eof() {
        match cursor.field()? {
            (1, FieldValue::Bytes(b)) => parameter.secret_bytes = b.to_vec(),
            (2, FieldValue::Bytes(b)) => {
                parameter.label = Some(String::from_utf8_lossy(b).into_owned())
            }
            (3, FieldValue::Bytes(b)) => {
                parameter.issuer = Some(String::from_utf8_lossy(b).into_owned())
            }
            (4, FieldValue::Varint(v)) => parameter.algorithm_code = v,
            (5, FieldValue::Varint(v)) => parameter.digits_code = v,
            (6, FieldValue::Varint(v)) => parameter.otp_type = v,
            (7, FieldValue::Varint(v)) => parameter.counter = Some(v),
            (number @ 1..=7, _) => return Err(mismatched("OtpParameters", number)),
            (number, _) => log::debug!("skipping unknown OtpParameters field {number}"),
        }
    }

    Ok(parameter)
}

/// Decodes the binary payload into every record it holds, HOTP included.
///
/// A bounds violation anywhere aborts the whole batch.
pub fn decode_batch(bytes: &[u8]) -> Result<MigrationBatch, OtpError> {
    let mut cursor = Cursor::new(bytes);
    let mut batch = MigrationBatch::default();

    while !cursor.is_eof() {
        match cursor.field()? {
            (1, FieldValue::Bytes(b)) => batch.parameters.push(decode_parameter(b)?),
            (2, FieldValue::Varint(v)) => batch.version = Some(v),
            (3, FieldValue::Varint(v)) => batch.batch_size = Some(v),
            (4, FieldValue::Varint(v)) => batch.batch_index = Some(v),
            (5, FieldValue::Varint(v)) => batch.batch_id = Some(v),
            (number @ 1..=5, _) => return Err(mismatched("MigrationPayload", number)),
            (number, _) => log::debug!("skipping unknown MigrationPayload field {number}"),
        }
    }

    Ok(batch)
}

/// Moves an `issuer:` prefix out of the record name when the record carries
/// no issuer of its own.
fn split_name(parameter: &mut RawOtpParameter) {
    let Some(name) = parameter.label.take() else {
        return;
    };

    match name.split_once(':') {
        Some((issuer, label)) => {
            if parameter.issuer.as_deref().map_or(true, str::is_empty) {
                parameter.issuer = Some(issuer.to_string());
            }
            parameter.label = Some(label.to_string());
        }
        None => parameter.label = Some(name),
    }
}

/// Extracts the TOTP records of a migration export, in payload order.
pub fn otp_from_migration_uri(uri: &str) -> Result<Vec<RawOtpParameter>, OtpError> {
    let uri = url::Url::parse(uri).map_err(OtpError::UriParseError)?;

    let data = uri
        .query_pairs()
        .find(|(key, _)| key == DATA_QUERY)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or(OtpError::MissingDataParameter)?;

    let bytes = codec::base64_decode(&data).map_err(OtpError::EnvelopeDecode)?;
    let batch = decode_batch(&bytes)?;
    log::debug!(
        "migration batch {:?}/{:?} (id {:?}) holds {} records",
        batch.batch_index,
        batch.batch_size,
        batch.batch_id,
        batch.parameters.len()
    );

    let mut parameters = Vec::with_capacity(batch.parameters.len());
    for (index, mut parameter) in batch.parameters.into_iter().enumerate() {
        if !parameter.is_totp() {
            log::debug!("dropping record {index} of type {}", parameter.otp_type);
            continue;
        }
        if parameter.secret_bytes.is_empty() {
            log::warn!("dropping record {index} without a secret");
            continue;
        }

        split_name(&mut parameter);
        parameters.push(parameter);
    }

    Ok(parameters)
}
