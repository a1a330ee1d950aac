//! Postgres Frontend Messages
//!
//! All struct fields here mirror the actual message sent to postgres.
use bytes::{BufMut, BytesMut};

use crate::ext::{BufMutExt, StrExt};

/// write a frontend message to `buf`
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size = msg.size_hint();
    buf.reserve(PREFIX + size as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_i32(4 + size);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size as usize,
        "[BUG] Frontend Message body not equal to size hint"
    );
}

/// A type which can be encoded into postgres frontend message
///
/// For historical reasons, the very first message sent by the client (the startup message)
/// has no initial message-type byte.
///
/// Thus, [`Startup`] does not implement [`FrontendProtocol`]
pub trait FrontendProtocol {
    /// message type
    const MSGTYPE: u8;

    /// size of the main body
    ///
    /// note that this is *only* the size of main body as oppose of actual postgres message
    fn size_hint(&self) -> i32;

    /// write the main body of the message
    ///
    /// `buf` have the length returned from `size_hint`
    ///
    /// writing less or past length results in panic
    fn encode(self, buf: impl BufMut);
}

/// Postgres Startup frontend message
///
/// <https://www.postgresql.org/docs/current/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-STARTUPMESSAGE>
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // reserve 4 bytes, patched once the body is written
        buf.put_i32(0);

        // The protocol version number: major 3 in the high 16 bits,
        // minor 0 in the low 16 bits.
        buf.put_i32(196608);

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(db) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(db);
        }

        // A zero byte is required as a terminator after the last name/value pair.
        buf.put_u8(b'\0');

        let size = i32::try_from(buf.len() - offset)
            .expect("message size too large for protocol");
        buf[offset..offset + 4].copy_from_slice(&size.to_be_bytes());
    }
}

/// Identifies the message as a password response.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested)
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> i32 {
        self.password.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.password);
    }
}

/// Identifies the message as a simple query
pub struct Query<'a> {
    /// the query string itself
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> i32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Salted password digest for the md5 authentication exchange.
///
/// `"md5" || lower_hex(md5(lower_hex(md5(password || user)) || salt))`
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = format!("{:x}", md5::compute([password.as_bytes(), user.as_bytes()].concat()));
    let mut outer = inner.into_bytes();
    outer.extend_from_slice(&salt);
    format!("md5{:x}", md5::compute(outer))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::backend;

    #[test]
    fn envelope_roundtrip() {
        let mut buf = BytesMut::new();
        write(Query { sql: "SELECT 1" }, &mut buf);

        assert_eq!(buf[0], b'Q');
        // length counts itself plus the trailing nul
        assert_eq!(&buf[1..5], &13i32.to_be_bytes());

        let (tag, body) = backend::split_message(&mut buf).unwrap().unwrap();
        assert_eq!(tag, b'Q');
        assert_eq!(&body[..], b"SELECT 1\0");
        assert!(buf.is_empty());
    }

    #[test]
    fn startup_message_bytes() {
        let mut buf = BytesMut::new();
        Startup { user: "alice", database: Some("pings") }.write(&mut buf);

        let mut expect = vec![0u8; 4];
        expect.extend(196608i32.to_be_bytes());
        expect.extend(b"user\0alice\0database\0pings\0\0");
        let len = expect.len() as i32;
        expect[..4].copy_from_slice(&len.to_be_bytes());

        assert_eq!(&buf[..], &expect[..]);
    }

    #[test]
    fn md5_recipe() {
        let payload = md5_password("alice", "secret", [1, 2, 3, 4]);

        let inner = format!("{:x}", md5::compute(b"secretalice"));
        let mut outer = inner.into_bytes();
        outer.extend_from_slice(&[1, 2, 3, 4]);
        let expect = format!("md5{:x}", md5::compute(outer));

        assert_eq!(payload, expect);
        assert_eq!(payload.len(), 3 + 32);
        assert!(payload[3..].bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn password_message_length() {
        let password = md5_password("alice", "secret", [9, 9, 9, 9]);
        let mut buf = BytesMut::new();
        write(PasswordMessage { password: &password }, &mut buf);

        assert_eq!(buf[0], b'p');
        assert_eq!(&buf[1..5], &(password.len() as i32 + 5).to_be_bytes());
        assert_eq!(buf.last(), Some(&0));
    }
}
