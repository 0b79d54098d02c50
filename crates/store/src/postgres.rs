//! PostgreSQL-backed table store.
//!
//! Each table holds one row per envelope with the payload stored as JSONB.
//! Soft durability maps to `synchronous_commit = off` for the insert
//! transaction: the commit is acknowledged before the WAL is flushed.

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{debug, info, warn};

use bmo_core::config::StoreConfig;
use bmo_core::{BmoError, Envelope};

use crate::error::StoreError;
use crate::traits::{Durability, TableStore};

pub const DEFAULT_PORT: u16 = 5432;

/// Split a `host[:port]` node address. Bracketed IPv6 (`[::1]:5432`) is
/// accepted; a bare IPv6 address takes the default port.
pub fn parse_node(node: &str) -> Result<(String, u16), BmoError> {
    let node = node.trim();
    if node.is_empty() {
        return Err(BmoError::NodeAddress(node.to_string()));
    }

    if let Some(rest) = node.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| BmoError::NodeAddress(node.to_string()))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port
                .parse()
                .map_err(|_| BmoError::NodeAddress(node.to_string()))?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return Err(BmoError::NodeAddress(node.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    match node.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.contains(':') => {
            let port = port
                .parse()
                .map_err(|_| BmoError::NodeAddress(node.to_string()))?;
            Ok((host.to_string(), port))
        }
        Some((host, _)) if host.is_empty() => Err(BmoError::NodeAddress(node.to_string())),
        _ => Ok((node.to_string(), DEFAULT_PORT)),
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct PgTableStore {
    pool: PgPool,
    node: String,
}

impl PgTableStore {
    /// Connect to the first reachable node in `config.nodes`.
    ///
    /// The pool holds up to `max_connections` connections; callers size it
    /// to the number of concurrent insert workers.
    pub async fn connect(config: &StoreConfig, max_connections: u32) -> Result<Self, StoreError> {
        if config.nodes.is_empty() {
            return Err(StoreError::Connection("no node addresses configured".into()));
        }
        let ssl_mode = PgSslMode::from_str(&config.ssl_mode)
            .map_err(|e| StoreError::Connection(format!("invalid ssl mode: {e}")))?;

        let mut failures = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let (host, port) = parse_node(node)?;
            let mut options = PgConnectOptions::new()
                .host(&host)
                .port(port)
                .database(&config.database)
                .ssl_mode(ssl_mode);
            if let Some(ref user) = config.username {
                options = options.username(user);
            }
            if let Some(ref password) = config.password {
                options = options.password(password);
            }

            let connected = PgPoolOptions::new()
                .max_connections(max_connections.max(1))
                .acquire_timeout(config.connect_timeout())
                .connect_with(options)
                .await;

            match connected {
                Ok(pool) => {
                    info!(
                        node = %node,
                        database = %config.database,
                        max_connections,
                        "PostgreSQL connected"
                    );
                    return Ok(Self {
                        pool,
                        node: node.clone(),
                    });
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "node unreachable");
                    failures.push(format!("{node}: {e}"));
                }
            }
        }

        Err(StoreError::Connection(failures.join("; ")))
    }

    /// The node address this session is connected to.
    pub fn node(&self) -> &str {
        &self.node
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TableStore for PgTableStore {
    async fn list_tables(&self) -> Result<BTreeSet<String>, StoreError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema()",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("list tables failed: {e}")))?;

        Ok(names.into_iter().collect())
    }

    async fn create_table(&self, table: &str) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGSERIAL PRIMARY KEY, \
             sequence BIGINT NOT NULL, \
             ingested_at BIGINT NOT NULL, \
             payload JSONB NOT NULL)",
            quote_ident(table)
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::CreateTable {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn insert(
        &self,
        table: &str,
        envelopes: &[Envelope],
        durability: Durability,
    ) -> Result<u64, StoreError> {
        let rejected = |reason: String| StoreError::Insert {
            table: table.to_string(),
            reason,
        };

        let mut sequences = Vec::with_capacity(envelopes.len());
        let mut ingested = Vec::with_capacity(envelopes.len());
        let mut payloads = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let sequence = i64::try_from(envelope.sequence)
                .map_err(|_| rejected(format!("sequence {} out of range", envelope.sequence)))?;
            sequences.push(sequence);
            ingested.push(envelope.ingested_at);
            payloads.push(envelope.payload.to_string());
        }

        let sql = format!(
            "INSERT INTO {} (sequence, ingested_at, payload) \
             SELECT s, t, p::jsonb FROM UNNEST($1::int8[], $2::int8[], $3::text[]) AS u(s, t, p)",
            quote_ident(table)
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(format!("begin failed: {e}")))?;

        if durability == Durability::Soft {
            sqlx::query("SET LOCAL synchronous_commit = off")
                .execute(&mut *tx)
                .await
                .map_err(|e| rejected(e.to_string()))?;
        }

        let result = sqlx::query(&sql)
            .bind(sequences)
            .bind(ingested)
            .bind(payloads)
            .execute(&mut *tx)
            .await
            .map_err(|e| rejected(e.to_string()))?;

        tx.commit().await.map_err(|e| rejected(format!("commit failed: {e}")))?;

        debug!(table, rows = result.rows_affected(), %durability, "insert committed");
        Ok(result.rows_affected())
    }

    fn provider(&self) -> &str {
        "postgres"
    }
}
