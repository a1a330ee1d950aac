//! Query result accumulation.
//!
//! One simple query produces at most one `RowDescription`, zero or more
//! `DataRow`s, one `CommandComplete` (or `ErrorResponse`), and one
//! `ReadyForQuery`. [`QueryResult`] folds that message stream into a record;
//! a field stays `None` when the corresponding message never arrived.
use bytes::{Buf, Bytes};
use std::{fmt, num::ParseIntError, str::Utf8Error};

use crate::{
    Result,
    common::ByteStr,
    ext::BytesExt,
    postgres::{self, Oid, ProtocolError, backend, BackendMessage},
};

/// Column metadata retained from a `RowDescription`.
///
/// The wire format carries eight fields per column; only the name and the
/// type oid matter to this client.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: ByteStr,
    pub type_oid: Oid,
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Wire length `-1`, distinct from an empty string.
    Null,
    Varchar(ByteStr),
    Int8(i64),
    /// Unrecognized oid, raw bytes preserved.
    Bytes(Bytes),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Varchar(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// One decoded row, values aligned with the result's [`ColumnDescriptor`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub(crate) Vec<Value>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl IntoIterator for Row {
    type Item = Value;

    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Accumulated response to one simple query.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Column descriptors, present once a `RowDescription` arrived.
    pub fields: Option<Vec<ColumnDescriptor>>,
    /// Decoded rows in arrival order.
    pub rows: Option<Vec<Row>>,
    /// Command tag, e.g. `SELECT 2`.
    pub command: Option<ByteStr>,
    /// Backend transaction status from `ReadyForQuery`.
    pub status: Option<u8>,
    /// Field-type code of an `ErrorResponse`, if the query failed server-side.
    pub error: Option<u8>,
}

impl QueryResult {
    /// Returns `true` if the server answered with an `ErrorResponse`.
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn fold(&mut self, message: BackendMessage) -> Result<()> {
        match message {
            BackendMessage::RowDescription(desc) => {
                let mut body = desc.body;
                let mut fields = Vec::with_capacity(desc.field_len as usize);
                for _ in 0..desc.field_len {
                    let name = ByteStr::from_utf8(body.get_nul_bytes()).map_err(DecodeError::Utf8)?;
                    // table oid + attribute number
                    body.advance(6);
                    let type_oid = body.get_u32();
                    // type size + type modifier + format code
                    body.advance(8);
                    fields.push(ColumnDescriptor { name, type_oid });
                }
                self.fields = Some(fields);
                self.rows = Some(Vec::new());
            }
            BackendMessage::DataRow(row) => {
                let Some(fields) = self.fields.as_ref() else {
                    return Err(ProtocolError::Unexpected {
                        found: backend::DataRow::MSGTYPE,
                        phase: "a result with no row description",
                    }
                    .into());
                };
                let mut body = row.body;
                let mut values = Vec::with_capacity(row.column_len as usize);
                for i in 0..row.column_len as usize {
                    let len = body.get_i32();
                    if len == -1 {
                        values.push(Value::Null);
                        continue;
                    }
                    let value = body.split_to(len as usize);
                    let oid = fields.get(i).map(|f| f.type_oid).unwrap_or(0);
                    values.push(postgres::decode(oid, value)?);
                }
                self.rows.get_or_insert_with(Vec::new).push(Row(values));
            }
            BackendMessage::CommandComplete(cmd) => {
                self.command = Some(ByteStr::from_utf8(cmd.tag).map_err(DecodeError::Utf8)?);
            }
            BackendMessage::ReadyForQuery(ready) => {
                self.status = Some(ready.status);
            }
            BackendMessage::ErrorResponse(err) => {
                self.error = Some(err.field_code());
            }
            BackendMessage::Authentication(_) => {
                return Err(ProtocolError::Unexpected {
                    found: backend::Authentication::MSGTYPE,
                    phase: "a query response",
                }
                .into());
            }
        }
        Ok(())
    }
}

/// An error when decoding a wire value.
pub enum DecodeError {
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Non decimal digits in a numeric column.
    Int(ParseIntError),
}

impl std::error::Error for DecodeError { }

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Failed to decode value, ")?;
        match self {
            DecodeError::Utf8(e) => write!(f, "{e}"),
            DecodeError::Int(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<ParseIntError>e => Self::Int(e));

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::{BackendProtocol, INT8, VARCHAR};
    use bytes::BufMut;

    fn row_description(cols: &[(&str, Oid)]) -> BackendMessage {
        let mut body = Vec::new();
        body.put_u16(cols.len() as u16);
        for (name, oid) in cols {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.put_u32(0); // table oid
            body.put_u16(0); // attribute number
            body.put_u32(*oid);
            body.put_i16(0); // type size
            body.put_i32(-1); // type modifier
            body.put_u16(0); // format code
        }
        BackendMessage::decode(b'T', Bytes::from(body)).unwrap()
    }

    fn data_row(cols: &[Option<&[u8]>]) -> BackendMessage {
        let mut body = Vec::new();
        body.put_u16(cols.len() as u16);
        for col in cols {
            match col {
                Some(value) => {
                    body.put_i32(value.len() as i32);
                    body.extend_from_slice(value);
                }
                None => body.put_i32(-1),
            }
        }
        BackendMessage::decode(b'D', Bytes::from(body)).unwrap()
    }

    fn command_complete(tag: &str) -> BackendMessage {
        let mut body = tag.as_bytes().to_vec();
        body.push(0);
        BackendMessage::decode(b'C', Bytes::from(body)).unwrap()
    }

    fn ready(status: u8) -> BackendMessage {
        BackendMessage::decode(b'Z', Bytes::copy_from_slice(&[status])).unwrap()
    }

    #[test]
    fn empty_result_set() {
        let mut result = QueryResult::default();
        result.fold(row_description(&[("device_id", VARCHAR)])).unwrap();
        result.fold(command_complete("SELECT 0")).unwrap();
        result.fold(ready(b'I')).unwrap();

        assert_eq!(result.fields.as_ref().unwrap().len(), 1);
        assert_eq!(result.rows.as_deref(), Some(&[][..]));
        assert_eq!(result.command.as_deref(), Some("SELECT 0"));
        assert_eq!(result.status, Some(b'I'));
        assert!(!result.is_err());
    }

    #[test]
    fn null_field_is_not_empty_string() {
        let mut result = QueryResult::default();
        result.fold(row_description(&[("device_id", VARCHAR)])).unwrap();
        result.fold(data_row(&[None])).unwrap();

        let rows = result.rows.as_ref().unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Null));
        assert_ne!(rows[0].get(0), Some(&Value::Varchar(ByteStr::from_static(""))));
    }

    #[test]
    fn unknown_oid_preserved_as_raw_bytes() {
        let mut result = QueryResult::default();
        result.fold(row_description(&[("payload", 999)])).unwrap();
        result.fold(data_row(&[Some(&[0x01, 0xff])])).unwrap();

        let rows = result.rows.as_ref().unwrap();
        assert_eq!(rows[0].get(0).unwrap().as_bytes(), Some(&[0x01, 0xff][..]));
        assert!(matches!(rows[0].get(0), Some(Value::Bytes(_))));
    }

    #[test]
    fn int8_decoded_from_ascii_decimal() {
        let mut result = QueryResult::default();
        result.fold(row_description(&[("epoch_time", INT8)])).unwrap();
        result.fold(data_row(&[Some(b"-9007199254740993")])).unwrap();

        let rows = result.rows.as_ref().unwrap();
        assert_eq!(rows[0].get(0).unwrap().as_i64(), Some(-9007199254740993));
    }

    #[test]
    fn rows_kept_in_arrival_order() {
        let mut result = QueryResult::default();
        result.fold(row_description(&[("device_id", VARCHAR)])).unwrap();
        for value in [b"a", b"b", b"c"] {
            result.fold(data_row(&[Some(value)])).unwrap();
        }

        let rows = result.rows.as_ref().unwrap();
        let order: Vec<_> = rows.iter().map(|r| r.get(0).unwrap().as_str().unwrap()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn data_row_without_description_is_protocol_error() {
        let mut result = QueryResult::default();
        assert!(result.fold(data_row(&[Some(b"a")])).is_err());
    }

    #[test]
    fn error_response_sets_field_code_only() {
        let mut result = QueryResult::default();
        let err = BackendMessage::decode(b'E', Bytes::from_static(b"SERROR\0\0")).unwrap();
        result.fold(err).unwrap();
        result.fold(ready(b'E')).unwrap();

        assert_eq!(result.error, Some(b'S'));
        assert!(result.rows.is_none());
        assert_eq!(result.status, Some(b'E'));
        assert!(result.is_err());
    }
}
