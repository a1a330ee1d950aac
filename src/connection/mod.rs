//! One authenticated connection, serving one query at a time.
use bytes::{Bytes, BytesMut};
use std::{fmt, io, sync::atomic::Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    Result,
    common::{span, verbose},
    net::Socket,
    postgres::{
        self, BackendProtocol, ProtocolError,
        backend::{self, Authentication},
        frontend::{self, FrontendProtocol},
    },
    result::QueryResult,
};

mod config;

pub use config::{Config, ParseError};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Identity of one worker connection.
///
/// Replacement workers always carry a fresh id.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WorkerId([u8; 6]);

impl WorkerId {
    pub(crate) fn next() -> Self {
        static ID: std::sync::atomic::AtomicU16 = std::sync::atomic::AtomicU16::new(0);
        let id = ID.fetch_add(1, Ordering::SeqCst);
        let mut buf = [b'w', b'0', b'0', b'0', b'0', b'0'];
        let len = buf.len();

        let mut b = itoa::Buffer::new();
        let id = b.format(id);
        let i = id.as_bytes();
        buf[len - i.len()..].copy_from_slice(i);

        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: ascii only construction and is immutable
        unsafe { std::str::from_utf8_unchecked(&self.0[..]) }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("WorkerId").field(&self.as_str()).finish()
    }
}

/// The server requested an authentication method this client cannot answer.
pub struct AuthDenied {
    pub(crate) code: u32,
}

impl AuthDenied {
    /// The authentication sub-code the server asked for.
    pub fn code(&self) -> u32 {
        self.code
    }
}

impl std::error::Error for AuthDenied { }

impl fmt::Display for AuthDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication denied: server requested method {}, only md5 (5) is supported", self.code)
    }
}

impl fmt::Debug for AuthDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Postgres Connection.
///
/// Owns its socket exclusively. Startup, authentication and the configured
/// prepare plans run once at birth; afterwards the connection serves one
/// simple query at a time. Any failure poisons it permanently, the pool
/// replaces poisoned connections on release.
#[derive(Debug)]
pub struct Connection {
    id: WorkerId,

    // io
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,

    poisoned: bool,
}

impl Connection {
    /// Connect and authenticate via url.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect and authenticate with a config.
    pub async fn connect_with(config: Config) -> Result<Self> {
        let socket = Socket::connect(&config.host, config.port).await?;

        let mut me = Self {
            id: WorkerId::next(),
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            poisoned: false,
        };

        me.startup(&config).await?;

        Ok(me)
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Run one simple query and fold the response into a [`QueryResult`].
    ///
    /// A server-side `ErrorResponse` is not an `Err` here: it lands in
    /// [`QueryResult::error`] and the connection stays healthy. Socket,
    /// framing and decode failures are `Err` and poison the connection.
    pub async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        if self.poisoned {
            return Err(ProtocolError::Poisoned.into());
        }

        // cleared only on a clean completion, so a failure or an abandoned
        // call can never hand a half-read socket back to the pool
        self.poisoned = true;
        let result = self.query_inner(sql).await?;
        self.poisoned = false;

        Ok(result)
    }

    async fn query_inner(&mut self, sql: &str) -> Result<QueryResult> {
        span!("query", worker = self.id.as_str());

        self.send(frontend::Query { sql });
        self.flush().await?;

        if self.read_buf.is_empty() {
            self.fill().await?;
        }

        // fold complete messages until the accumulator drains; bytes of a
        // partial message trigger further reads, bytes of a complete one
        // wait for the next call
        let mut result = QueryResult::default();
        loop {
            let (tag, body) = self.recv_msg().await?;
            result.fold(backend::BackendMessage::decode(tag, body)?)?;
            if self.read_buf.is_empty() {
                break;
            }
        }

        Ok(result)
    }

    async fn startup(&mut self, config: &Config) -> Result<()> {
        span!("startup", worker = self.id.as_str());

        frontend::Startup {
            user: &config.user,
            database: Some(&config.dbname),
        }
        .write(&mut self.write_buf);
        self.flush().await?;

        match self.recv::<Authentication>().await? {
            Authentication::Md5Password { salt } => {
                let password = frontend::md5_password(&config.user, &config.pass, salt);
                self.send(frontend::PasswordMessage { password: &password });
                self.flush().await?;
            }
            auth => return Err(AuthDenied { code: auth.code() }.into()),
        }

        // any sub-code concludes authentication; a non-R tag is fatal
        self.recv::<Authentication>().await?;

        // the server follows up with ParameterStatus, BackendKeyData and the
        // like, none of which this client consumes
        self.drain_ready().await?;

        for plan in &config.prepare_plans {
            self.send(frontend::Query { sql: plan });
            self.flush().await?;
            self.recv::<backend::CommandComplete>().await?;
            self.drain_ready().await?;
        }

        Ok(())
    }

    /// Skip backend messages until `ReadyForQuery`.
    ///
    /// Only used between exchanges during startup; the service loop never
    /// tolerates unknown tags.
    async fn drain_ready(&mut self) -> Result<()> {
        loop {
            let (tag, body) = self.recv_msg().await?;
            match tag {
                backend::ReadyForQuery::MSGTYPE => return Ok(()),
                backend::ErrorResponse::MSGTYPE => {
                    return Err(backend::ErrorResponse { body }.into());
                }
                _ => {}
            }
        }
    }

    /// Receive one typed message. An `ErrorResponse` in its place is
    /// returned as `Err`.
    async fn recv<B: BackendProtocol>(&mut self) -> Result<B> {
        let (tag, body) = self.recv_msg().await?;
        if tag == backend::ErrorResponse::MSGTYPE {
            return Err(backend::ErrorResponse { body }.into());
        }
        Ok(B::decode(tag, body)?)
    }

    async fn recv_msg(&mut self) -> Result<(u8, Bytes)> {
        loop {
            if let Some((tag, body)) = postgres::split_message(&mut self.read_buf)? {
                verbose!(target: "wire", "(B) 0x{tag:02x}, {} bytes", body.len());
                return Ok((tag, body));
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        if self.socket.read_buf(&mut self.read_buf).await? == 0 {
            return Err(ProtocolError::UnexpectedEof.into());
        }
        Ok(())
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!(target: "wire", "(F) 0x{:02x}", F::MSGTYPE);
        frontend::write(message, &mut self.write_buf);
    }

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        self.socket.write_all_buf(&mut self.write_buf)
    }
}
