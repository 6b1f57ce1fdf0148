//! Schema migrations.
//!
//! DDL is emitted per dialect: SQLite keeps loose TEXT affinity while
//! MySQL needs sized VARCHARs for indexed columns and an InnoDB engine
//! clause for the cascade foreign key.

use cronhook_core::config::DatabaseKind;
use cronhook_core::error::Result;
use tracing::{debug, info};

use crate::pool::DatabasePool;
use crate::row::store_err;

pub struct Migrator;

impl Migrator {
    /// Create the schema if it does not exist
    pub async fn run(pool: &DatabasePool) -> Result<()> {
        info!("Running database migrations");

        for statement in Self::table_statements(pool.kind()) {
            sqlx::query(statement)
                .execute(pool.inner())
                .await
                .map_err(store_err)?;
        }

        for statement in Self::index_statements(pool.kind()) {
            // MySQL has no CREATE INDEX IF NOT EXISTS; a duplicate-index
            // error on re-run is expected and ignored.
            if let Err(err) = sqlx::query(statement).execute(pool.inner()).await {
                debug!(error = %err, "Index creation skipped");
            }
        }

        info!("Database migrations complete");
        Ok(())
    }

    fn table_statements(kind: DatabaseKind) -> Vec<&'static str> {
        match kind {
            DatabaseKind::Sqlite => vec![
                r#"
                CREATE TABLE IF NOT EXISTS cronjobs (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    method TEXT NOT NULL,
                    headers TEXT,
                    body TEXT,
                    schedule TEXT NOT NULL,
                    schedule_type TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    request_timeout BIGINT,
                    execution_mode TEXT NOT NULL DEFAULT 'sequential',
                    max_concurrent INTEGER NOT NULL DEFAULT 1,
                    current_running INTEGER NOT NULL DEFAULT 0,
                    execution_count BIGINT NOT NULL DEFAULT 0,
                    last_executed_at BIGINT,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS execution_logs (
                    id TEXT PRIMARY KEY,
                    job_id TEXT NOT NULL REFERENCES cronjobs(id) ON DELETE CASCADE,
                    executed_at BIGINT NOT NULL,
                    status TEXT NOT NULL,
                    response_code INTEGER,
                    execution_time BIGINT NOT NULL DEFAULT 0,
                    response_body TEXT,
                    error_message TEXT,
                    triggered_manually INTEGER NOT NULL DEFAULT 0
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS tags (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    color TEXT,
                    created_at BIGINT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS cronjob_tags (
                    job_id TEXT NOT NULL REFERENCES cronjobs(id) ON DELETE CASCADE,
                    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                    PRIMARY KEY (job_id, tag_id)
                )
                "#,
            ],
            DatabaseKind::Mysql => vec![
                r#"
                CREATE TABLE IF NOT EXISTS cronjobs (
                    id VARCHAR(36) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    url TEXT NOT NULL,
                    method VARCHAR(8) NOT NULL,
                    headers TEXT,
                    body TEXT,
                    schedule VARCHAR(255) NOT NULL,
                    schedule_type VARCHAR(16) NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    request_timeout BIGINT,
                    execution_mode VARCHAR(16) NOT NULL DEFAULT 'sequential',
                    max_concurrent INTEGER NOT NULL DEFAULT 1,
                    current_running INTEGER NOT NULL DEFAULT 0,
                    execution_count BIGINT NOT NULL DEFAULT 0,
                    last_executed_at BIGINT,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL
                ) ENGINE=InnoDB
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS execution_logs (
                    id VARCHAR(36) PRIMARY KEY,
                    job_id VARCHAR(36) NOT NULL,
                    executed_at BIGINT NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    response_code INTEGER,
                    execution_time BIGINT NOT NULL DEFAULT 0,
                    response_body TEXT,
                    error_message TEXT,
                    triggered_manually INTEGER NOT NULL DEFAULT 0,
                    CONSTRAINT fk_execution_logs_job
                        FOREIGN KEY (job_id) REFERENCES cronjobs(id) ON DELETE CASCADE
                ) ENGINE=InnoDB
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS tags (
                    id VARCHAR(36) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL UNIQUE,
                    color VARCHAR(32),
                    created_at BIGINT NOT NULL
                ) ENGINE=InnoDB
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS cronjob_tags (
                    job_id VARCHAR(36) NOT NULL,
                    tag_id VARCHAR(36) NOT NULL,
                    PRIMARY KEY (job_id, tag_id),
                    CONSTRAINT fk_cronjob_tags_job
                        FOREIGN KEY (job_id) REFERENCES cronjobs(id) ON DELETE CASCADE,
                    CONSTRAINT fk_cronjob_tags_tag
                        FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
                ) ENGINE=InnoDB
                "#,
            ],
        }
    }

    fn index_statements(kind: DatabaseKind) -> Vec<&'static str> {
        match kind {
            DatabaseKind::Sqlite => vec![
                "CREATE INDEX IF NOT EXISTS idx_execution_logs_job_id ON execution_logs (job_id)",
                "CREATE INDEX IF NOT EXISTS idx_execution_logs_executed_at ON execution_logs (executed_at)",
                "CREATE INDEX IF NOT EXISTS idx_execution_logs_status ON execution_logs (status)",
                "CREATE INDEX IF NOT EXISTS idx_cronjobs_is_active ON cronjobs (is_active)",
                "CREATE INDEX IF NOT EXISTS idx_cronjobs_schedule_type ON cronjobs (schedule_type)",
            ],
            DatabaseKind::Mysql => vec![
                "CREATE INDEX idx_execution_logs_job_id ON execution_logs (job_id)",
                "CREATE INDEX idx_execution_logs_executed_at ON execution_logs (executed_at)",
                "CREATE INDEX idx_execution_logs_status ON execution_logs (status)",
                "CREATE INDEX idx_cronjobs_is_active ON cronjobs (is_active)",
                "CREATE INDEX idx_cronjobs_schedule_type ON cronjobs (schedule_type)",
            ],
        }
    }
}
