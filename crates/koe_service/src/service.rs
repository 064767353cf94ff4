//! Case service
//!
//! Write path of one submission:
//!
//! ```text
//! parse -> read (events, version) -> version check -> project -> validate
//!       -> append(expected_version) -> re-project -> inform collaborators
//! ```
//!
//! Parsing and rule failures abort before the store is touched, so the log
//! never holds an unparsable or rule-violating event. Collaborators are
//! informed only after the append has committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use core_kernel::{EventId, HealthCheckResult, SakId};
use domain_koe::{
    regel_spor, AktorRolle, Event, EventType, KoeValidator, SakProjector, SakState, SporType,
    Submission,
};
use infra_store::{open_store, EventLog, EventStore};

use crate::collaborators::{
    InMemoryMetadataCache, MetadataCache, NoopNotificationSink, NotificationSink, SakMetadata,
    Tilstandsendring,
};
use crate::config::KoeConfig;
use crate::error::ServiceError;

/// Result of an accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// Version of the log after the append
    pub version: u64,
    /// State folded from the log at `version`
    pub state: SakState,
    /// Identities the store assigned, in append order
    pub event_ids: Vec<EventId>,
}

/// A case state together with the log version it was folded from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseView {
    pub version: u64,
    pub state: SakState,
}

/// One line of a case timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: EventId,
    pub event_type: EventType,
    pub tidsstempel: DateTime<Utc>,
    pub aktor: String,
    pub aktor_rolle: AktorRolle,
    pub spor: Option<SporType>,
    pub sammendrag: String,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type(),
            tidsstempel: event.tidsstempel,
            aktor: event.aktor.clone(),
            aktor_rolle: event.aktor_rolle,
            spor: event.spor(),
            sammendrag: event.payload.sammendrag(),
        }
    }
}

/// Ordered event summaries of a case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub version: u64,
    pub events: Vec<EventSummary>,
}

/// Orchestrates the store, projector, validator and collaborators
///
/// # Example
///
/// ```rust,ignore
/// let service = KoeService::new(Arc::new(store));
/// let view = service.get_state(&sak_id).await?;
/// let outcome = service.submit(submission, view.version).await?;
/// ```
pub struct KoeService {
    store: Arc<EventStore>,
    validator: KoeValidator,
    projector: SakProjector,
    metadata: Arc<dyn MetadataCache>,
    notifications: Arc<dyn NotificationSink>,
}

impl KoeService {
    /// Creates a service with an in-memory metadata cache and no notifications
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            validator: KoeValidator::new(),
            projector: SakProjector::new(),
            metadata: Arc::new(InMemoryMetadataCache::new()),
            notifications: Arc::new(NoopNotificationSink),
        }
    }

    /// Opens the configured store and creates a service on it
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Store` if the backend cannot be opened
    pub async fn from_config(config: &KoeConfig) -> Result<Self, ServiceError> {
        let store = open_store(&config.store).await?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn with_validator(mut self, validator: KoeValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_metadata_cache(mut self, metadata: Arc<dyn MetadataCache>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_notification_sink(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Parses a raw client submission and submits it
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if the body is malformed or carries
    /// server-owned fields, otherwise as [`submit`](Self::submit).
    pub async fn submit_json(
        &self,
        body: Value,
        expected_version: u64,
    ) -> Result<SubmitOutcome, ServiceError> {
        let submission = Submission::from_json(body)?;
        self.submit(submission, expected_version).await
    }

    /// Validates and appends one submission
    ///
    /// # Arguments
    ///
    /// * `submission` - The proposed event
    /// * `expected_version` - Version of the log the client last saw
    ///
    /// # Returns
    ///
    /// The new version and the state folded from the log at that version
    ///
    /// # Errors
    ///
    /// * `ServiceError::Validation` - payload constraint violated
    /// * `ServiceError::Concurrency` - the log is not at `expected_version`
    /// * `ServiceError::BusinessRule` - the case state forbids the event
    #[instrument(skip(self, submission), fields(sak_id = %submission.sak_id, event_type = %submission.event_type()))]
    pub async fn submit(
        &self,
        submission: Submission,
        expected_version: u64,
    ) -> Result<SubmitOutcome, ServiceError> {
        self.submit_batch(vec![submission], expected_version).await
    }

    /// Validates and appends several submissions for one case atomically
    ///
    /// Each candidate is checked against the state folded with the candidates
    /// before it, so a batch may open a case and send its first claim.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit); additionally `ServiceError::Validation`
    /// if the batch is empty or spans several cases. Nothing is appended if
    /// any candidate fails.
    pub async fn submit_batch(
        &self,
        submissions: Vec<Submission>,
        expected_version: u64,
    ) -> Result<SubmitOutcome, ServiceError> {
        let sak_id = match submissions.first() {
            Some(first) => first.sak_id.clone(),
            None => return Err(ServiceError::validation("Ingen hendelser å lagre")),
        };
        if submissions.iter().any(|s| s.sak_id != sak_id) {
            return Err(ServiceError::validation_field(
                "Alle hendelser i en batch må gjelde samme sak",
                "sak_id",
            ));
        }
        for submission in &submissions {
            submission.validate()?;
        }

        let log = self.store.get_events(&sak_id).await?;
        if log.version != expected_version {
            warn!(
                sak_id = %sak_id,
                expected = expected_version,
                actual = log.version,
                "submission based on stale version"
            );
            return Err(ServiceError::Concurrency {
                sak_id,
                expected: expected_version,
                actual: log.version,
            });
        }

        let EventLog { mut events, .. } = log;
        let committed = events.len();
        let before = self.projector.project(&events);
        let mut state = before.clone();
        let mut candidates = Vec::with_capacity(submissions.len());

        for (index, submission) in submissions.into_iter().enumerate() {
            let event = submission.into_event();
            let result = self.validator.validate(&event, &state);
            if let Some(regel) = result.violated_rule {
                let melding = result.message.unwrap_or_default();
                warn!(
                    sak_id = %sak_id,
                    event_type = %event.event_type(),
                    index,
                    regel = %regel,
                    "submission rejected"
                );
                return Err(ServiceError::BusinessRule {
                    regel,
                    spor: regel_spor(regel, event.event_type()),
                    melding,
                });
            }
            state = self.projector.apply(&state, &event);
            candidates.push(event);
        }

        let version = self.store.append_batch(candidates.clone(), expected_version).await?;
        info!(
            sak_id = %sak_id,
            version,
            count = candidates.len(),
            "submission accepted"
        );

        // Full re-fold of the log as committed at `version`
        events.extend(candidates);
        let after = self.projector.project(&events);

        self.inform(&sak_id, before, &events[committed..], &after).await;

        Ok(SubmitOutcome {
            version,
            event_ids: events[committed..].iter().map(|e| e.event_id).collect(),
            state: after,
        })
    }

    async fn inform(&self, sak_id: &SakId, before: SakState, appended: &[Event], after: &SakState) {
        let mut gammel = before;
        for hendelse in appended {
            let ny = self.projector.apply(&gammel, hendelse);
            let endring = Tilstandsendring {
                sak_id,
                gammel: &gammel,
                ny: &ny,
                hendelse,
            };
            if let Err(e) = self.notifications.varsle(endring).await {
                warn!(sak_id = %sak_id, error = %e, "notification sink failed");
            }
            gammel = ny;
        }

        if let Some(metadata) = SakMetadata::fra_state(after) {
            if let Err(e) = self.metadata.oppdater(metadata).await {
                warn!(sak_id = %sak_id, error = %e, "metadata cache update failed");
            }
        }
    }

    /// Reads and projects a case
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the case has no events
    pub async fn get_state(&self, sak_id: &SakId) -> Result<CaseView, ServiceError> {
        let log = self.read_existing(sak_id).await?;
        Ok(CaseView {
            version: log.version,
            state: self.projector.project(&log.events),
        })
    }

    /// Reads the event summaries of a case in log order
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the case has no events
    pub async fn get_timeline(&self, sak_id: &SakId) -> Result<Timeline, ServiceError> {
        let log = self.read_existing(sak_id).await?;
        Ok(Timeline {
            version: log.version,
            events: log.events.iter().map(EventSummary::from).collect(),
        })
    }

    async fn read_existing(&self, sak_id: &SakId) -> Result<EventLog, ServiceError> {
        let log = self.store.get_events(sak_id).await?;
        if log.is_empty() {
            debug!(sak_id = %sak_id, "case not found");
            return Err(ServiceError::NotFound(sak_id.clone()));
        }
        Ok(log)
    }

    /// Lists every case with at least one event
    pub async fn list_saker(&self) -> Result<Vec<SakId>, ServiceError> {
        Ok(self.store.list_saker().await?)
    }

    /// Recomputes the metadata cache from the logs
    ///
    /// # Returns
    ///
    /// The number of cases written to the cache
    pub async fn rebuild_metadata(&self) -> Result<usize, ServiceError> {
        let mut count = 0;
        for sak_id in self.store.list_saker().await? {
            let log = self.store.get_events(&sak_id).await?;
            let Some(metadata) = SakMetadata::fra_state(&self.projector.project(&log.events)) else {
                continue;
            };
            self.metadata.oppdater(metadata).await?;
            count += 1;
        }
        info!(count, "metadata cache rebuilt");
        Ok(count)
    }

    /// Reports the health of the event store
    pub async fn health_check(&self) -> HealthCheckResult {
        self.store.health_check().await
    }
}
