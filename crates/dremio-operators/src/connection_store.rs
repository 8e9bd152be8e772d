use std::collections::HashMap;
use std::sync::RwLock;

use dremio_client::ConnectionRecord;

use crate::error::{OperatorError, OperatorResult};

/// A source of named connection records.
pub trait ConnectionStore: Send + Sync {
    fn get_connection(&self, conn_id: &str) -> OperatorResult<ConnectionRecord>;
}

/// Environment variables for connection records.
pub struct ConnectionStoreEnv;

impl ConnectionStoreEnv {
    /// The prefix of the variables holding a connection as a JSON document.
    /// The connection id is upper-cased and `-` becomes `_`,
    /// so `dremio_default` is read from `DREMIO_CONN_DREMIO_DEFAULT`.
    pub const CONNECTION_PREFIX: &'static str = "DREMIO_CONN_";

    pub fn variable_name(conn_id: &str) -> String {
        format!(
            "{}{}",
            Self::CONNECTION_PREFIX,
            conn_id.to_uppercase().replace('-', "_")
        )
    }
}

/// Reads connection records from environment variables.
#[derive(Debug, Default)]
pub struct EnvConnectionStore;

impl ConnectionStore for EnvConnectionStore {
    fn get_connection(&self, conn_id: &str) -> OperatorResult<ConnectionRecord> {
        let name = ConnectionStoreEnv::variable_name(conn_id);
        let value = std::env::var(&name).map_err(|_| {
            OperatorError::ConnectionNotFound(format!("{conn_id} (environment variable {name})"))
        })?;
        let mut connection: ConnectionRecord = serde_json::from_str(&value).map_err(|e| {
            OperatorError::invalid(format!("invalid connection in {name}: {e}"))
        })?;
        connection.conn_id = conn_id.to_string();
        Ok(connection)
    }
}

#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<HashMap<String, ConnectionRecord>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: ConnectionRecord) -> OperatorResult<()> {
        let mut connections = self
            .connections
            .write()
            .map_err(|e| OperatorError::internal(e.to_string()))?;
        connections.insert(connection.conn_id.clone(), connection);
        Ok(())
    }

    pub fn with_connection(self, connection: ConnectionRecord) -> OperatorResult<Self> {
        self.insert(connection)?;
        Ok(self)
    }
}

impl ConnectionStore for MemoryConnectionStore {
    fn get_connection(&self, conn_id: &str) -> OperatorResult<ConnectionRecord> {
        let connections = self
            .connections
            .read()
            .map_err(|e| OperatorError::internal(e.to_string()))?;
        connections
            .get(conn_id)
            .cloned()
            .ok_or_else(|| OperatorError::ConnectionNotFound(conn_id.to_string()))
    }
}
