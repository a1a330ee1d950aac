//! Database access core for the device ping service.
//!
//! Speaks the Postgres v3 wire protocol over raw TCP: startup, MD5-salted
//! authentication, server-side prepare plans, then simple queries whose
//! responses fold into a [`QueryResult`]. A fixed-size [`Pool`] multiplexes
//! concurrent callers onto long-lived authenticated connections, queueing
//! FIFO under saturation and replacing workers that die.
//!
//! # Examples
//!
//! ```no_run
//! use pingbase::{Config, Pool, PoolConfig, sql::ExecuteCall};
//!
//! # async fn app() -> pingbase::Result<()> {
//! let config = Config::parse("postgres://ping:secret@db:5432/pings")?
//!     .prepare_plan(
//!         "PREPARE ping_insert (text, int8) AS \
//!          INSERT INTO pings (device_id, epoch_time) VALUES ($1, $2)",
//!     );
//!
//! let pool = Pool::connect_with(PoolConfig::new(config)).await?;
//!
//! let res = pool
//!     .query(&ExecuteCall::new("ping_insert").arg_text("d1").arg_int(1700000000).finish())
//!     .await?;
//! assert!(res.error.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! A process usually wraps the pool in the singleton [`Service`]:
//!
//! ```no_run
//! use pingbase::{PoolConfig, Service};
//!
//! # async fn boot() -> pingbase::Result<()> {
//! Service::start("pings", PoolConfig::from_env()).await?.install();
//!
//! let res = Service::global().unwrap().query("EXECUTE ping_count").await?;
//! assert!(res.error.is_none());
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;
mod net;

// Protocol
pub mod postgres;

// Component
mod result;
pub mod sql;

// Connection
pub mod connection;
pub mod pool;
mod service;

mod error;

#[doc(inline)]
pub use connection::{Config, Connection, WorkerId};
#[doc(inline)]
pub use pool::{Pool, PoolConfig, PoolConnection, PoolStatus};
pub use result::{ColumnDescriptor, DecodeError, QueryResult, Row, Value};
pub use service::Service;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
