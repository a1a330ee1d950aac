//! Database connection pooling.
//!
//! A fixed-size set of worker connections behind a single serializing
//! supervisor task. Callers that arrive while every worker is busy suspend
//! on a FIFO queue; a released worker is handed directly to the longest
//! suspended waiter. A worker that dies is replaced with a fresh one that
//! re-runs full startup.
use crate::{Connection, QueryResult, Result};

mod config;
mod worker;

pub use config::PoolConfig;
pub use worker::PoolStatus;

/// Database connection pool handle.
///
/// Cloning is cheap; all clones drive the same supervisor task. The
/// supervisor exits and closes every socket once the last handle drops.
#[derive(Debug, Clone)]
pub struct Pool {
    handle: worker::Handle,
}

impl Pool {
    /// Create [`Pool`] from a url, with env defaults for sizing.
    pub async fn connect(url: &str) -> Result<Self> {
        PoolConfig::from_env().connect(url).await
    }

    /// Create [`Pool`] and wait until it is ready.
    ///
    /// Ready means every initial worker either finished startup or died and
    /// had a replacement spawned; a pool facing a dead database still boots.
    pub async fn connect_with(config: PoolConfig) -> Result<Self> {
        let pool = Self::connect_lazy_with(config);
        pool.handle.ready().await;
        Ok(pool)
    }

    /// Create [`Pool`] without waiting for worker startup.
    pub fn connect_lazy_with(config: PoolConfig) -> Self {
        let (handle, supervisor) = worker::Handle::new(config);
        tokio::spawn(supervisor);
        Self { handle }
    }

    /// Check out a worker, suspending FIFO when none is idle.
    pub async fn acquire(&self) -> Result<PoolConnection> {
        let conn = self.handle.acquire().await?;
        Ok(PoolConnection { conn: Some(conn), handle: self.handle.clone() })
    }

    /// Acquire, run one query, release.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let mut conn = self.acquire().await?;
        conn.query(sql).await
    }

    /// Snapshot of worker and waiter counts.
    pub async fn status(&self) -> PoolStatus {
        self.handle.status().await
    }
}

/// A checked out [`Connection`], released back to the pool on drop.
#[derive(Debug)]
pub struct PoolConnection {
    conn: Option<Connection>,
    handle: worker::Handle,
}

impl std::ops::Deref for PoolConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        // `conn` only `None` on drop
        self.conn.as_ref().unwrap()
    }
}

impl std::ops::DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap()
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.handle.release(conn);
        }
    }
}
