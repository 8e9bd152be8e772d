use std::sync::Arc;

use dremio_client::DremioClient;
use dremio_common::config::ClientConfig;
use log::debug;
use tokio::sync::OnceCell;

use crate::connection_store::ConnectionStore;
use crate::error::OperatorResult;

/// Binds a connection id to a lazily authenticated [`DremioClient`].
///
/// The client is created on first use and reused afterwards, so a single
/// operator run logs in at most once.
pub struct DremioHook {
    conn_id: String,
    store: Arc<dyn ConnectionStore>,
    config: ClientConfig,
    client: OnceCell<DremioClient>,
}

impl DremioHook {
    pub const DEFAULT_CONN_ID: &'static str = "dremio_default";

    pub fn new(conn_id: impl Into<String>, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            conn_id: conn_id.into(),
            store,
            config: ClientConfig::default(),
            client: OnceCell::new(),
        }
    }

    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub async fn client(&self) -> OperatorResult<&DremioClient> {
        self.client
            .get_or_try_init(|| async {
                let connection = self.store.get_connection(&self.conn_id)?;
                debug!("connecting to Dremio with connection {}", self.conn_id);
                Ok(DremioClient::connect(&connection, &self.config).await?)
            })
            .await
    }
}
