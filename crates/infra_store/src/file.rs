//! JSON file repository
//!
//! Each case is one document `<data_dir>/<sak_id>.json`:
//!
//! ```json
//! { "version": 2, "events": [ { "event_id": "...", "event_type": "sak_opprettet", "data": { } }, ... ] }
//! ```
//!
//! A write produces a complete new document in a temporary file in the same
//! directory, syncs it to disk and renames it over the old one. Readers see
//! either the old or the new document.
//!
//! The compare-and-swap is a read followed by the rename, so writers to the
//! same case must be serialized by the caller; [`EventStore`](crate::EventStore)
//! does this with its per-case lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use core_kernel::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, SakId};
use domain_koe::Event;

use crate::error::StoreError;
use crate::repository::{EventLog, EventRepository};

const EXTENSION: &str = "json";

#[derive(Deserialize)]
struct StoredLog {
    version: u64,
    events: Vec<Event>,
}

#[derive(Serialize)]
struct StoredLogRef<'a> {
    version: u64,
    events: &'a [Event],
}

/// Case logs stored as JSON documents
#[derive(Debug, Clone)]
pub struct JsonFileEventRepository {
    data_dir: PathBuf,
}

impl JsonFileEventRepository {
    /// Opens a repository rooted at `data_dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await?;
        debug!(data_dir = %data_dir.display(), "opened file event repository");
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, sak_id: &SakId) -> PathBuf {
        // SakId only admits [A-Za-z0-9_-], so the id is a safe file stem
        self.data_dir.join(format!("{}.{EXTENSION}", sak_id.as_str()))
    }

    async fn load(&self, sak_id: &SakId) -> Result<Vec<Event>, StoreError> {
        let bytes = match fs::read(self.path_for(sak_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredLog = serde_json::from_slice(&bytes)?;
        if stored.version != stored.events.len() as u64 {
            return Err(StoreError::corrupt(
                sak_id,
                format!(
                    "version {} does not match {} stored events",
                    stored.version,
                    stored.events.len()
                ),
            ));
        }
        Ok(stored.events)
    }

    async fn persist(&self, sak_id: &SakId, events: &[Event]) -> Result<(), StoreError> {
        let document = StoredLogRef {
            version: events.len() as u64,
            events,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let target = self.path_for(sak_id);
        let temp = self
            .data_dir
            .join(format!(".{}.{}.tmp", sak_id.as_str(), Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &target).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %temp.display(), error = %cleanup, "failed to remove temp file");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }
}

impl DomainPort for JsonFileEventRepository {}

#[async_trait]
impl HealthCheckable for JsonFileEventRepository {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = fs::metadata(&self.data_dir).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(meta) if meta.is_dir() => {
                HealthCheckResult::new("file-event-repository", AdapterHealth::Healthy, latency_ms)
            }
            Ok(_) => HealthCheckResult::new("file-event-repository", AdapterHealth::Unhealthy, latency_ms)
                .with_message(format!("{} is not a directory", self.data_dir.display())),
            Err(e) => HealthCheckResult::new("file-event-repository", AdapterHealth::Unhealthy, latency_ms)
                .with_message(format!("Data directory error: {e}")),
        }
    }
}

#[async_trait]
impl EventRepository for JsonFileEventRepository {
    async fn read(&self, sak_id: &SakId) -> Result<EventLog, StoreError> {
        Ok(EventLog::new(self.load(sak_id).await?))
    }

    async fn write(
        &self,
        sak_id: &SakId,
        events: &[Event],
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut log = self.load(sak_id).await?;
        let actual = log.len() as u64;
        if actual != expected_version {
            return Err(StoreError::concurrency(sak_id, expected_version, actual));
        }

        log.extend_from_slice(events);
        self.persist(sak_id, &log).await?;
        Ok(log.len() as u64)
    }

    async fn list_saker(&self) -> Result<Vec<SakId>, StoreError> {
        let mut saker = Vec::new();
        let mut entries = fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match SakId::new(stem) {
                Ok(sak_id) => saker.push(sak_id),
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring foreign file"),
            }
        }
        saker.sort();
        Ok(saker)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
