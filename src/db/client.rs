//! PostgreSQL client wrapper.

use tokio_postgres::{Client, NoTls};
use tracing::error;

use crate::error::{ImportError, Result};

/// A single database connection with its driver task spawned.
pub struct PgClient {
    client: Client,
}

impl PgClient {
    /// Connect and drive the connection on a background task.
    pub async fn connect(conninfo: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conninfo, NoTls)
            .await
            .map_err(ImportError::ConnectionFailed)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("database connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    /// Get the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run one or more statements, discarding any results.
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(ImportError::QueryFailed)
    }
}
