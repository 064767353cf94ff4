//! Collaborator ports
//!
//! The case core informs two outside parties after a successful append:
//!
//! - a **metadata cache** holding title and overall status per case, used
//!   for listings; it is never authoritative and can be rebuilt from the logs
//! - a **notification sink** receiving the state transition and the event
//!   that caused it
//!
//! Both are fire-and-forget. Their failures are logged by the service and
//! never undo a committed event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{DomainPort, PortError, SakId};
use domain_koe::{Event, OverordnetStatus, SakState};

/// Cached listing data for one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SakMetadata {
    pub sak_id: SakId,
    pub sakstittel: Option<String>,
    pub status: OverordnetStatus,
    pub sist_oppdatert: DateTime<Utc>,
}

impl SakMetadata {
    /// Derives the cache entry from a projected state
    ///
    /// Returns `None` for a state folded from an empty log.
    pub fn fra_state(state: &SakState) -> Option<Self> {
        let sak_id = state.sak_id.clone()?;
        Some(Self {
            sak_id,
            sakstittel: state.sakstittel.clone(),
            status: state.overordnet_status,
            sist_oppdatert: state.sist_oppdatert.unwrap_or_else(Utc::now),
        })
    }
}

/// A state transition caused by one appended event
#[derive(Debug, Clone, Copy)]
pub struct Tilstandsendring<'a> {
    pub sak_id: &'a SakId,
    pub gammel: &'a SakState,
    pub ny: &'a SakState,
    pub hendelse: &'a Event,
}

/// Title/status cache for case listings
#[async_trait]
pub trait MetadataCache: DomainPort {
    /// Records the latest title and status of a case
    async fn oppdater(&self, metadata: SakMetadata) -> Result<(), PortError>;
}

/// Receiver of state transitions
#[async_trait]
pub trait NotificationSink: DomainPort {
    async fn varsle(&self, endring: Tilstandsendring<'_>) -> Result<(), PortError>;
}

/// Sink that discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSink;

impl DomainPort for NoopNotificationSink {}

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn varsle(&self, _endring: Tilstandsendring<'_>) -> Result<(), PortError> {
        Ok(())
    }
}

/// Sink that writes one structured log line per transition
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl DomainPort for TracingNotificationSink {}

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn varsle(&self, endring: Tilstandsendring<'_>) -> Result<(), PortError> {
        info!(
            sak_id = %endring.sak_id,
            event_type = %endring.hendelse.event_type(),
            aktor_rolle = %endring.hendelse.aktor_rolle,
            fra = ?endring.gammel.overordnet_status,
            til = ?endring.ny.overordnet_status,
            "case state changed"
        );
        Ok(())
    }
}

/// Process-local metadata cache
#[derive(Debug, Default)]
pub struct InMemoryMetadataCache {
    entries: DashMap<SakId, SakMetadata>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sak_id: &SakId) -> Option<SakMetadata> {
        self.entries.get(sak_id).map(|entry| entry.value().clone())
    }

    /// Every cached case, ordered by id
    pub fn alle(&self) -> Vec<SakMetadata> {
        let mut alle: Vec<SakMetadata> = self.entries.iter().map(|e| e.value().clone()).collect();
        alle.sort_by(|a, b| a.sak_id.cmp(&b.sak_id));
        alle
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl DomainPort for InMemoryMetadataCache {}

#[async_trait]
impl MetadataCache for InMemoryMetadataCache {
    async fn oppdater(&self, metadata: SakMetadata) -> Result<(), PortError> {
        self.entries.insert(metadata.sak_id.clone(), metadata);
        Ok(())
    }
}
