//! PostgreSQL wire-protocol warehouse connection.

use async_trait::async_trait;
use tokio_postgres::{Client, Config as PgConfig, NoTls, SimpleQueryMessage};
use tracing::{debug, error, info};

use super::{TlsBuilder, Warehouse};
use crate::config::WarehouseConfig;
use crate::error::{EtlError, Result};

/// A single autocommit connection to the warehouse.
///
/// Statements go through the simple query protocol, so each one commits on
/// its own as soon as it completes.
pub struct PgWarehouse {
    client: Client,
    database: String,
}

impl PgWarehouse {
    /// Open a connection described by `config`.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        info!("Opening warehouse database: {}", config.database);

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("i94-etl");

        let client = match TlsBuilder::parse(&config.ssl_mode)?.build()? {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Warehouse connection error: {}", e);
                    }
                });
                client
            }
            None => {
                let (client, connection) = pg_config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Warehouse connection error: {}", e);
                    }
                });
                client
            }
        };

        info!(
            "Opened warehouse database: {} ({})",
            config.database,
            config.display_string()
        );

        Ok(Self {
            client,
            database: config.database.clone(),
        })
    }

    /// Name of the connected database.
    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn execute(&self, statement: &str) -> Result<u64> {
        debug!("Executing: {}", statement);
        let messages = self.client.simple_query(statement).await?;

        let affected = messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum();

        Ok(affected)
    }

    async fn commit(&self) -> Result<()> {
        // Autocommit: every simple query has already committed.
        if self.client.is_closed() {
            return Err(EtlError::Query(
                "connection closed before commit".to_string(),
            ));
        }
        Ok(())
    }

    async fn query_scalar(&self, query: &str) -> Result<Option<String>> {
        debug!("Querying: {}", query);
        let messages = self.client.simple_query(query).await?;

        for message in &messages {
            if let SimpleQueryMessage::Row(row) = message {
                let value = row.try_get(0)?;
                return Ok(value.map(str::to_string));
            }
        }

        Ok(None)
    }
}
