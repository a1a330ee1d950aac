//! Postgres v3 wire protocol: message framing, frontend and backend messages.
pub mod backend;
pub mod frontend;

mod pg_type;

pub use backend::{BackendMessage, BackendProtocol, ErrorResponse};
pub use frontend::FrontendProtocol;
pub use pg_type::{INT8, Oid, VARCHAR};

pub(crate) use backend::split_message;
pub(crate) use pg_type::decode;

/// An error when translating buffer from postgres
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A message tag that has no business arriving at this point.
    #[error("unexpected message tag 0x{found:02x} during {phase}")]
    Unexpected { found: u8, phase: &'static str },

    /// A recognized exchange answered with the wrong message type.
    #[error("expected message tag 0x{expect:02x}, found 0x{found:02x}")]
    Mismatch { expect: u8, found: u8 },

    /// The length field must at least count itself.
    #[error("invalid envelope length {len} for message tag 0x{tag:02x}")]
    Envelope { tag: u8, len: i32 },

    /// The server closed the socket with a message half delivered.
    #[error("connection closed by server mid-message")]
    UnexpectedEof,

    /// An earlier failure left the connection in an unknown protocol state.
    #[error("connection poisoned by an earlier failure")]
    Poisoned,
}
