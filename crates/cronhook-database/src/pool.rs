//! Connection pool over the SQLx Any driver.

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use std::time::Duration;

use cronhook_core::config::{DatabaseConfig, DatabaseKind};
use cronhook_core::error::Result;

use crate::row::store_err;

/// Shared handle to the relational store
#[derive(Clone)]
pub struct DatabasePool {
    pool: AnyPool,
    kind: DatabaseKind,
}

impl DatabasePool {
    /// Connect using the configured backend
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url())
            .await
            .map_err(store_err)?;

        Ok(Self {
            pool,
            kind: config.kind,
        })
    }

    /// Connect to an in-memory SQLite database (tests)
    pub async fn connect_in_memory() -> Result<Self> {
        sqlx::any::install_default_drivers();

        // One connection so every query sees the same memory database
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(store_err)?;

        Ok(Self {
            pool,
            kind: DatabaseKind::Sqlite,
        })
    }

    pub fn inner(&self) -> &AnyPool {
        &self.pool
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Verify the connection is usable
    pub async fn health_check(&self) -> Result<()> {
        let _row: AnyRow = sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
