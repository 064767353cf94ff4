//! Client submissions
//!
//! A submission is an event as a client proposes it: everything except the
//! identity and timestamp, which the server assigns when the event is accepted.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use core_kernel::{CoreError, EventId, SakId};

use crate::error::KoeError;
use crate::events::{AktorRolle, Event, EventPayload, EventType};

/// Envelope fields owned by the server
const SERVER_OWNED_FIELDS: [&str; 2] = ["event_id", "tidsstempel"];

/// A proposed event, not yet accepted into a case log
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub sak_id: SakId,
    pub aktor: String,
    pub aktor_rolle: AktorRolle,
    pub versjon: Option<u32>,
    pub payload: EventPayload,
}

#[derive(Debug, Deserialize)]
struct RawSubmission {
    sak_id: SakId,
    event_type: String,
    aktor: String,
    aktor_rolle: AktorRolle,
    #[serde(default)]
    versjon: Option<u32>,
    #[serde(default)]
    data: Value,
}

impl Submission {
    /// Creates a submission from a typed payload
    pub fn new(
        sak_id: SakId,
        aktor: impl Into<String>,
        aktor_rolle: AktorRolle,
        payload: EventPayload,
    ) -> Self {
        Self {
            sak_id,
            aktor: aktor.into(),
            aktor_rolle,
            versjon: None,
            payload,
        }
    }

    /// Sets the revision number the client claims for this submission
    pub fn with_versjon(mut self, versjon: u32) -> Self {
        self.versjon = Some(versjon);
        self
    }

    /// Parses a submission from client JSON
    ///
    /// # Errors
    ///
    /// * `KoeError::ServerOwnedField` if the client supplied `event_id` or `tidsstempel`
    /// * `KoeError::UnknownEventType` for an unrecognised discriminant
    /// * `KoeError::Malformed` for any other decoding failure
    pub fn from_json(value: Value) -> Result<Self, KoeError> {
        if let Some(object) = value.as_object() {
            if let Some(field) = SERVER_OWNED_FIELDS.iter().find(|f| object.contains_key(**f)) {
                return Err(KoeError::ServerOwnedField((*field).to_string()));
            }
        }

        let raw: RawSubmission = serde_json::from_value(value)?;
        let event_type: EventType = raw.event_type.parse()?;
        let payload = EventPayload::from_parts(event_type, raw.data)?;

        Ok(Self {
            sak_id: raw.sak_id,
            aktor: raw.aktor,
            aktor_rolle: raw.aktor_rolle,
            versjon: raw.versjon,
            payload,
        })
    }

    /// Returns the discriminant of the proposed event
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Checks envelope and payload constraints
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for an empty actor name or an invalid payload.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.aktor.trim().is_empty() {
            return Err(CoreError::validation_field("Aktør må oppgis", "aktor"));
        }
        self.payload.validate()
    }

    /// Turns the submission into an event with a fresh identity and the current time
    pub fn into_event(self) -> Event {
        self.into_event_with(EventId::new(), Utc::now())
    }

    /// Turns the submission into an event with the given identity and timestamp
    pub fn into_event_with(self, event_id: EventId, tidsstempel: DateTime<Utc>) -> Event {
        Event {
            event_id,
            sak_id: self.sak_id,
            tidsstempel,
            aktor: self.aktor,
            aktor_rolle: self.aktor_rolle,
            versjon: self.versjon,
            payload: self.payload,
        }
    }
}
