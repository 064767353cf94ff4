//! In-memory repository
//!
//! Logs live in a map behind an async `RwLock`. The compare-and-swap runs
//! under the write lock, so the backend is safe to share without an
//! [`EventStore`](crate::EventStore) in front of it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use core_kernel::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, SakId};
use domain_koe::Event;

use crate::error::StoreError;
use crate::repository::{EventLog, EventRepository};

/// Process-local case logs
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    logs: RwLock<HashMap<SakId, Vec<Event>>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cases with at least one event
    pub async fn len(&self) -> usize {
        self.logs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.logs.read().await.is_empty()
    }
}

impl DomainPort for InMemoryEventRepository {}

#[async_trait]
impl HealthCheckable for InMemoryEventRepository {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::new("memory-event-repository", AdapterHealth::Healthy, 0)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn read(&self, sak_id: &SakId) -> Result<EventLog, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(sak_id)
            .map(|events| EventLog::new(events.clone()))
            .unwrap_or_default())
    }

    async fn write(
        &self,
        sak_id: &SakId,
        events: &[Event],
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut logs = self.logs.write().await;
        let actual = logs.get(sak_id).map_or(0, |log| log.len() as u64);
        if actual != expected_version {
            return Err(StoreError::concurrency(sak_id, expected_version, actual));
        }

        let log = logs.entry(sak_id.clone()).or_default();
        log.extend_from_slice(events);
        let version = log.len() as u64;
        trace!(sak_id = %sak_id, version, "memory log appended");
        Ok(version)
    }

    async fn list_saker(&self) -> Result<Vec<SakId>, StoreError> {
        let logs = self.logs.read().await;
        let mut saker: Vec<SakId> = logs
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        saker.sort();
        Ok(saker)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
