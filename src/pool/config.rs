use crate::{Config, Result};

use super::Pool;

const DEFAULT_POOL_SIZE: usize = 10;

/// Pool configuration builder.
pub struct PoolConfig {
    pub(crate) conn: Config,
    pub(crate) size: usize,
}

impl PoolConfig {
    pub fn new(conn: Config) -> PoolConfig {
        Self { conn, size: DEFAULT_POOL_SIZE }
    }

    pub fn from_env() -> PoolConfig {
        Self::new(Config::from_env())
    }

    /// Get connection config.
    pub fn connection(&self) -> &Config {
        &self.conn
    }

    /// Set the fixed number of workers.
    pub fn size(mut self, value: usize) -> Self {
        self.size = value;
        self
    }
}

impl PoolConfig {
    pub async fn connect(mut self, url: &str) -> Result<Pool> {
        self.conn = Config::parse(url)?;
        Pool::connect_with(self).await
    }
}
