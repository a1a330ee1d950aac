//! Process-wide database service.
use std::sync::OnceLock;

use crate::{Pool, PoolConfig, QueryResult, Result};

static SERVICE: OnceLock<Service> = OnceLock::new();

/// A named handle over one pool, one per process.
///
/// Boot it once at startup and route every query through it; the underlying
/// workers hold their authenticated sockets for the process lifetime.
#[derive(Debug)]
pub struct Service {
    name: &'static str,
    pool: Pool,
}

impl Service {
    /// Boot the pool and wait until it is ready.
    pub async fn start(name: &'static str, config: PoolConfig) -> Result<Service> {
        let pool = Pool::connect_with(config).await?;
        tracing::debug!(service = name, "database service ready");
        Ok(Service { name, pool })
    }

    /// Register this service as the process-wide instance.
    ///
    /// # Panics
    ///
    /// Panics when a service is already installed.
    pub fn install(self) -> &'static Service {
        if SERVICE.set(self).is_err() {
            panic!("database service already installed");
        }
        SERVICE.get().expect("installed above")
    }

    /// The process-wide instance, if one was installed.
    pub fn global() -> Option<&'static Service> {
        SERVICE.get()
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Acquire a worker, run one query, release it.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.pool.query(sql).await
    }
}
