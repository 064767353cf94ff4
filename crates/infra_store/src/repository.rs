//! Repository port for case logs
//!
//! A repository persists one append-only log per case. `write` is a
//! compare-and-swap: it appends only if the stored version still equals the
//! version the caller expects, and it commits the whole slice or nothing.

use async_trait::async_trait;

use core_kernel::{DomainPort, HealthCheckable, SakId};
use domain_koe::Event;

use crate::error::StoreError;

/// A case log as read from storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    /// Events in append order
    pub events: Vec<Event>,
    /// Always equal to `events.len()`
    pub version: u64,
}

impl EventLog {
    pub fn new(events: Vec<Event>) -> Self {
        let version = events.len() as u64;
        Self { events, version }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Persistence backend for case logs
///
/// Implementations must make `write` atomic: a reader sees either the log
/// before the write or the log after it, never a partial append.
#[async_trait]
pub trait EventRepository: DomainPort + HealthCheckable {
    /// Reads the log of a case
    ///
    /// # Returns
    ///
    /// The ordered events and version; an unknown case yields an empty log
    /// with version 0.
    async fn read(&self, sak_id: &SakId) -> Result<EventLog, StoreError>;

    /// Appends events if the stored version equals `expected_version`
    ///
    /// # Arguments
    ///
    /// * `sak_id` - The case all `events` belong to
    /// * `events` - Events to append, in order
    /// * `expected_version` - Version the caller last read
    ///
    /// # Returns
    ///
    /// The new version, `expected_version + events.len()`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the stored version differs.
    async fn write(
        &self,
        sak_id: &SakId,
        events: &[Event],
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Lists every case with a non-empty log, ordered by id
    async fn list_saker(&self) -> Result<Vec<SakId>, StoreError>;

    /// Short name of the backend, used in logs
    fn backend_name(&self) -> &'static str;
}
