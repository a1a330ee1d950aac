use bytes::Bytes;

use crate::{
    common::ByteStr,
    result::{DecodeError, Value},
};

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// `varchar` variable-length string with limit
pub const VARCHAR: Oid = 1043;

/// `int8` ~18 digit integer, 8-byte storage
pub const INT8: Oid = 20;

type Decoder = fn(Bytes) -> Result<Value, DecodeError>;

/// Decode a wire value by its column oid.
///
/// Anything outside the decoder table is preserved as raw bytes.
pub(crate) fn decode(oid: Oid, value: Bytes) -> Result<Value, DecodeError> {
    decoder(oid)(value)
}

fn decoder(oid: Oid) -> Decoder {
    match oid {
        VARCHAR => decode_varchar,
        INT8 => decode_int8,
        _ => decode_raw,
    }
}

fn decode_varchar(value: Bytes) -> Result<Value, DecodeError> {
    Ok(Value::Varchar(ByteStr::from_utf8(value)?))
}

fn decode_int8(value: Bytes) -> Result<Value, DecodeError> {
    // int8 travels as ASCII decimal digits even over a binary-mode socket
    let digits = std::str::from_utf8(&value)?;
    Ok(Value::Int8(digits.parse()?))
}

fn decode_raw(value: Bytes) -> Result<Value, DecodeError> {
    Ok(Value::Bytes(value))
}
