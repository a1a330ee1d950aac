//! Postgres Backend Messages
use bytes::{Buf, Bytes, BytesMut};

use super::ProtocolError;
use crate::ext::{BytesExt, FmtExt};

/// Split one complete message off the accumulator.
///
/// Returns `None` until the whole envelope has been buffered; partial bytes
/// are left untouched for the next read.
pub(crate) fn split_message(buf: &mut BytesMut) -> Result<Option<(u8, Bytes)>, ProtocolError> {
    let Some(mut header) = buf.get(..5) else {
        return Ok(None);
    };

    let tag = header.get_u8();
    let len = header.get_i32();

    if len < 4 {
        return Err(ProtocolError::Envelope { tag, len });
    }

    let len = len as usize;
    if buf.len() - 1/*msgtype*/ < len {
        buf.reserve(1 + len - buf.len());
        return Ok(None);
    }

    buf.advance(5);
    let body = buf.split_to(len - 4).freeze();
    Ok(Some((tag, body)))
}

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError>;
}

/// The backend messages a query cycle can produce.
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    RowDescription(RowDescription),
    DataRow(DataRow),
    CommandComplete(CommandComplete),
    ReadyForQuery(ReadyForQuery),
    ErrorResponse(ErrorResponse),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::Unexpected { found: msgtype, phase: "the service loop" }),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    RowDescription,
    DataRow,
    CommandComplete,
    ReadyForQuery,
    ErrorResponse,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::Mismatch { expect: Self::MSGTYPE, found: $typ });
        }
    };
}

/// Identifies the message as an authentication request.
#[derive(Debug)]
pub enum Authentication {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that an MD5-encrypted password is required.
    Md5Password {
        /// The salt to use when encrypting the password.
        salt: [u8; 4],
    },
    /// Any other authentication method, by its sub-code.
    Other(u32),
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';

    pub fn code(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Md5Password { .. } => 5,
            Self::Other(code) => *code,
        }
    }
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        let auth = match body.get_u32() {
            0 => Authentication::Ok,
            5 => Authentication::Md5Password { salt: body.get_u32().to_be_bytes() },
            code => Authentication::Other(code),
        };
        Ok(auth)
    }
}

/// Identifies the message as a row description
#[derive(Debug)]
pub struct RowDescription {
    /// Specifies the number of fields in a row (can be zero).
    pub field_len: u16,
    /// Undecoded response body.
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            field_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a data row.
#[derive(Debug)]
pub struct DataRow {
    /// The number of column values that follow (possibly zero).
    pub column_len: u16,
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            column_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a command-completed response
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which
    /// SQL command was completed, e.g. `SELECT 17`.
    pub tag: Bytes,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.get_nul_bytes(),
        })
    }
}

/// ReadyForQuery is sent whenever the backend is ready for a new query cycle.
#[derive(Debug)]
pub struct ReadyForQuery {
    /// Current backend transaction status: `'I'` idle, `'T'` in a transaction
    /// block, `'E'` in a failed transaction block.
    pub status: u8,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { status: body.get_u8() })
    }
}

/// Identifies the message as an error
///
/// The message body consists of one or more identified fields, followed by a
/// zero byte as a terminator. Fields can appear in any order. For each field
/// there is a one byte field-type code followed by a nul terminated value.
pub struct ErrorResponse {
    pub body: Bytes,
}

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';

    /// The field-type code of the first error field.
    pub fn field_code(&self) -> u8 {
        self.body.first().copied().unwrap_or(0)
    }

    fn field(&self, want: u8) -> Option<&[u8]> {
        let mut rest = &self.body[..];
        while let Some((&code, tail)) = rest.split_first() {
            if code == 0 {
                break;
            }
            let end = tail.iter().position(|e| *e == 0)?;
            if code == want {
                return Some(&tail[..end]);
            }
            rest = &tail[end + 1..];
        }
        None
    }
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.field(b'S'), self.field(b'M')) {
            (Some(severity), Some(message)) => write!(f, "{}: {}", severity.lossy(), message.lossy()),
            _ => write!(f, "{}", self.body.lossy()),
        }
    }
}

impl std::fmt::Debug for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BufMut;

    fn message(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.put_i32(body.len() as i32 + 4);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn partial_reads_yield_identical_message() {
        let wire = message(b'C', b"SELECT 2\0");

        let mut whole = BytesMut::from(&wire[..]);
        let expect = split_message(&mut whole).unwrap().unwrap();

        let mut buf = BytesMut::new();
        let mut parsed = None;
        for (i, b) in wire.iter().enumerate() {
            buf.extend_from_slice(&[*b]);
            match split_message(&mut buf).unwrap() {
                Some(msg) => {
                    assert_eq!(i, wire.len() - 1, "message yielded before fully buffered");
                    parsed = Some(msg);
                }
                None => assert!(i < wire.len() - 1),
            }
        }

        assert_eq!(parsed.unwrap(), expect);
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_bytes_stay_buffered() {
        let first = message(b'C', b"SELECT 0\0");
        let second = message(b'Z', b"I");

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second[..3]);

        let (tag, body) = split_message(&mut buf).unwrap().unwrap();
        assert_eq!(tag, b'C');
        assert_eq!(&body[..], b"SELECT 0\0");
        assert_eq!(buf.len(), 3);

        assert!(split_message(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&second[3..]);
        let (tag, body) = split_message(&mut buf).unwrap().unwrap();
        assert_eq!(tag, b'Z');
        assert_eq!(&body[..], b"I");
        assert!(buf.is_empty());
    }

    #[test]
    fn undersized_envelope_rejected() {
        let mut buf = BytesMut::from(&[b'Z', 0, 0, 0, 2][..]);
        assert!(matches!(
            split_message(&mut buf),
            Err(ProtocolError::Envelope { tag: b'Z', len: 2 })
        ));
    }

    #[test]
    fn authentication_codes() {
        let mut body = 5i32.to_be_bytes().to_vec();
        body.extend_from_slice(&[1, 2, 3, 4]);
        let auth = Authentication::decode(b'R', Bytes::from(body)).unwrap();
        assert!(matches!(auth, Authentication::Md5Password { salt: [1, 2, 3, 4] }));

        let auth = Authentication::decode(b'R', Bytes::from(0i32.to_be_bytes().to_vec())).unwrap();
        assert!(matches!(auth, Authentication::Ok));

        let auth = Authentication::decode(b'R', Bytes::from(10i32.to_be_bytes().to_vec())).unwrap();
        assert_eq!(auth.code(), 10);
    }

    #[test]
    fn error_response_fields() {
        let err = ErrorResponse {
            body: Bytes::from_static(b"SERROR\0M relation \"pings\" does not exist\0\0"),
        };
        assert_eq!(err.field_code(), b'S');
        assert_eq!(err.field(b'S'), Some(&b"ERROR"[..]));
        assert!(err.to_string().starts_with("ERROR: "));
    }
}
