//! Optimistic-concurrency event store
//!
//! [`EventStore`] fronts a repository with a per-case exclusive lock:
//!
//! ```text
//! lock(sak_id) -> read version -> version == expected ? append : ConcurrencyError -> unlock
//! ```
//!
//! Writers to the same case are fully serialized; writers to different cases
//! never wait for each other. A case's lock lives in the registry only while
//! some writer holds or awaits it. The store checks version consistency only.
//! Business rules are the caller's concern.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use core_kernel::{HealthCheckResult, SakId};
use domain_koe::Event;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::file::JsonFileEventRepository;
use crate::memory::InMemoryEventRepository;
use crate::postgres::PostgresEventRepository;
use crate::repository::{EventLog, EventRepository};

/// Append-only case logs with compare-and-swap appends
///
/// # Example
///
/// ```rust,ignore
/// use infra_store::{EventStore, InMemoryEventRepository};
///
/// let store = EventStore::new(Arc::new(InMemoryEventRepository::new()));
/// let log = store.get_events(&sak_id).await?;
/// let version = store.append(event, log.version).await?;
/// ```
pub struct EventStore<R: ?Sized = dyn EventRepository> {
    repository: Arc<R>,
    locks: DashMap<SakId, Arc<Mutex<()>>>,
}

impl<R: EventRepository + ?Sized> EventStore<R> {
    /// Creates a store over the given repository
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
        }
    }

    /// Returns the underlying repository
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    fn lock_for(&self, sak_id: &SakId) -> Arc<Mutex<()>> {
        self.locks
            .entry(sak_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn acquire(&self, sak_id: &SakId) -> CaseLock<'_> {
        let guard = self.lock_for(sak_id).lock_owned().await;
        CaseLock {
            locks: &self.locks,
            sak_id: sak_id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of cases with a writer holding or awaiting their lock
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Reads the log of a case
    ///
    /// # Returns
    ///
    /// `(events, version)`; an unknown case yields `([], 0)`.
    pub async fn get_events(&self, sak_id: &SakId) -> Result<EventLog, StoreError> {
        let log = self.repository.read(sak_id).await?;
        debug!(sak_id = %sak_id, version = log.version, "read case log");
        Ok(log)
    }

    /// Appends one event
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Concurrency` if the log is no longer at `expected_version`.
    pub async fn append(&self, event: Event, expected_version: u64) -> Result<u64, StoreError> {
        self.append_batch(vec![event], expected_version).await
    }

    /// Appends several events atomically
    ///
    /// # Arguments
    ///
    /// * `events` - Non-empty list of events for one case
    /// * `expected_version` - Version the caller last read
    ///
    /// # Returns
    ///
    /// The new version, `expected_version + events.len()`
    ///
    /// # Errors
    ///
    /// * `StoreError::InvalidBatch` if the list is empty or spans several cases
    /// * `StoreError::Concurrency` if the log is no longer at `expected_version`
    pub async fn append_batch(
        &self,
        events: Vec<Event>,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let sak_id = match events.first() {
            Some(first) => first.sak_id.clone(),
            None => return Err(StoreError::invalid_batch("batch must contain at least one event")),
        };
        if let Some(other) = events.iter().find(|e| e.sak_id != sak_id) {
            return Err(StoreError::invalid_batch(format!(
                "batch mixes cases {sak_id} and {}",
                other.sak_id
            )));
        }

        let _lock = self.acquire(&sak_id).await;

        let current = self.repository.read(&sak_id).await?.version;
        if current != expected_version {
            warn!(
                sak_id = %sak_id,
                expected = expected_version,
                actual = current,
                "append rejected: version conflict"
            );
            return Err(StoreError::concurrency(&sak_id, expected_version, current));
        }

        match self.repository.write(&sak_id, &events, expected_version).await {
            Ok(version) => {
                info!(
                    sak_id = %sak_id,
                    count = events.len(),
                    version,
                    backend = self.repository.backend_name(),
                    "events appended"
                );
                Ok(version)
            }
            Err(e) => {
                if e.is_concurrency() {
                    // Another process wrote between our read and our write
                    warn!(sak_id = %sak_id, error = %e, "append rejected by repository");
                }
                Err(e)
            }
        }
    }

    /// Lists every case with a non-empty log
    pub async fn list_saker(&self) -> Result<Vec<SakId>, StoreError> {
        self.repository.list_saker().await
    }

    /// Reports the health of the underlying repository
    pub async fn health_check(&self) -> HealthCheckResult {
        self.repository.health_check().await
    }
}

/// Exclusive hold on one case's lock
///
/// Dropping it unlocks the case and removes the registry entry once no other
/// writer holds a clone of the mutex. `lock_for` clones under the same shard
/// lock `remove_if` takes, so a strong count of one means nobody is waiting.
struct CaseLock<'a> {
    locks: &'a DashMap<SakId, Arc<Mutex<()>>>,
    sak_id: SakId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CaseLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.sak_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Opens the repository selected by the configuration
///
/// # Errors
///
/// Returns an error if the backend cannot be initialised (directory creation,
/// database connection or migration).
pub async fn open_repository(config: &StoreConfig) -> Result<Arc<dyn EventRepository>, StoreError> {
    info!(backend = ?config.backend, "opening event repository");
    let repository: Arc<dyn EventRepository> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryEventRepository::new()),
        StoreBackend::File => Arc::new(JsonFileEventRepository::open(&config.data_dir).await?),
        StoreBackend::Postgres => {
            let repository = PostgresEventRepository::connect(config).await?;
            if config.run_migrations {
                repository.migrate().await?;
            }
            Arc::new(repository)
        }
    };
    Ok(repository)
}

/// Opens the configured repository and wraps it in an [`EventStore`]
pub async fn open_store(config: &StoreConfig) -> Result<EventStore, StoreError> {
    Ok(EventStore::new(open_repository(config).await?))
}
