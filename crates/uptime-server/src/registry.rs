//! Endpoint registry: the single owner of every endpoint record.

use crate::types::{Endpoint, EndpointId, RegisterEndpoint};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uptime_probe::ProbeOutcome;
use uuid::Uuid;

/// Registry of monitored endpoints.
///
/// All records live behind one reader/writer lock. Readers get owned
/// snapshots, so a record handed out is never observed mid-update. Every
/// write stamps the record with the next revision while the lock is held,
/// so revisions follow write order.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<BTreeMap<EndpointId, Endpoint>>,
    last_revision: AtomicU64,
}

impl EndpointRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint and return its id.
    ///
    /// An id is generated when none is supplied. Registering an existing id
    /// replaces the record and resets it to `checking`.
    pub async fn add(&self, registration: RegisterEndpoint) -> EndpointId {
        let id = registration
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_id);
        let mut endpoint = registration.into_endpoint(id.clone());

        info!(id = %id, name = %endpoint.name, url = %endpoint.url, "Registering endpoint");

        let mut endpoints = self.endpoints.write().await;
        endpoint.revision = self.next_revision();
        if endpoints.insert(id.clone(), endpoint).is_some() {
            debug!(id = %id, "Replaced existing endpoint");
        }
        id
    }

    /// Deregister an endpoint. Unknown ids are ignored.
    pub async fn remove(&self, id: &str) -> Option<Endpoint> {
        let removed = self.endpoints.write().await.remove(id);
        match &removed {
            Some(endpoint) => info!(id = %id, name = %endpoint.name, "Removed endpoint"),
            None => debug!(id = %id, "Remove of unknown endpoint ignored"),
        }
        removed
    }

    /// Snapshot of one endpoint
    pub async fn get(&self, id: &str) -> Option<Endpoint> {
        self.endpoints.read().await.get(id).cloned()
    }

    /// Snapshot of all endpoints, ordered by id
    pub async fn list(&self) -> Vec<Endpoint> {
        self.endpoints.read().await.values().cloned().collect()
    }

    /// Number of registered endpoints
    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }

    /// Record a probe outcome and return the updated snapshot.
    ///
    /// Returns `None` when the endpoint was removed while its probe was in
    /// flight; the outcome is then dropped.
    pub async fn update_after_probe(&self, id: &str, outcome: ProbeOutcome) -> Option<Endpoint> {
        let mut endpoints = self.endpoints.write().await;
        let endpoint = endpoints.get_mut(id)?;
        endpoint.apply(outcome);
        endpoint.revision = self.next_revision();
        Some(endpoint.clone())
    }

    fn next_revision(&self) -> u64 {
        self.last_revision.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn generate_id() -> EndpointId {
    format!("endpoint_{}", Uuid::new_v4().simple())
}
