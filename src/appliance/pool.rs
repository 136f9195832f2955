use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RouterOsConnection;
use crate::config::ApplianceSettings;
use crate::error::Result;
use crate::models::Appliance;

/// Live appliance sessions keyed by appliance id.
///
/// A session whose call fails is evicted and rebuilt on next use.
#[derive(Clone)]
pub struct AppliancePool {
    connections: Arc<RwLock<HashMap<Uuid, Arc<RouterOsConnection>>>>,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl AppliancePool {
    pub fn new(settings: &ApplianceSettings) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            timeout: settings.request_timeout(),
            accept_invalid_certs: settings.accept_invalid_certs,
        }
    }

    pub async fn get_or_connect(&self, appliance: &Appliance) -> Result<Arc<RouterOsConnection>> {
        let base_url = appliance.base_url.trim_end_matches('/');
        if let Some(conn) = self.connections.read().await.get(&appliance.id) {
            if conn.base_url() == base_url {
                return Ok(Arc::clone(conn));
            }
        }

        let conn = Arc::new(
            RouterOsConnection::connect(appliance, self.timeout, self.accept_invalid_certs).await?,
        );
        self.connections
            .write()
            .await
            .insert(appliance.id, Arc::clone(&conn));
        tracing::debug!(appliance = %appliance.name, "Appliance session opened");

        Ok(conn)
    }

    pub async fn evict(&self, appliance_id: Uuid) {
        if self.connections.write().await.remove(&appliance_id).is_some() {
            tracing::warn!(appliance_id = %appliance_id, "Appliance session evicted");
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
