//! Test Data Builders
//!
//! Builder patterns for constructing events and submissions with sensible
//! defaults. Tests specify only the fields they care about.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use core_kernel::{EventId, SakId};
use domain_koe::{AktorRolle, Event, EventType, Submission};

use crate::fixtures::{standard_rolle, DataFixtures, IdFixtures, TemporalFixtures};

/// Default actor names per role
pub fn standard_aktor(rolle: AktorRolle) -> &'static str {
    match rolle {
        AktorRolle::Te => "Tone Entreprenør",
        AktorRolle::Bh => "Bjørn Byggherre",
    }
}

/// Builder for test events
///
/// Defaults: the fixture case id, the conventional role for the event type,
/// the standard payload and the fixture start time.
///
/// # Example
///
/// ```rust,ignore
/// let event = EventBuilder::new(EventType::ResponsVederlag)
///     .data(DataFixtures::avslatt())
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event_type: EventType,
    sak_id: SakId,
    rolle: AktorRolle,
    aktor: Option<String>,
    versjon: Option<u32>,
    data: Value,
    event_id: EventId,
    tidsstempel: DateTime<Utc>,
}

impl EventBuilder {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            sak_id: IdFixtures::sak_id(),
            rolle: standard_rolle(event_type),
            aktor: None,
            versjon: None,
            data: DataFixtures::standard(event_type),
            event_id: EventId::new(),
            tidsstempel: TemporalFixtures::start(),
        }
    }

    pub fn sak(mut self, sak_id: SakId) -> Self {
        self.sak_id = sak_id;
        self
    }

    pub fn rolle(mut self, rolle: AktorRolle) -> Self {
        self.rolle = rolle;
        self
    }

    pub fn aktor(mut self, aktor: impl Into<String>) -> Self {
        self.aktor = Some(aktor.into());
        self
    }

    pub fn versjon(mut self, versjon: u32) -> Self {
        self.versjon = Some(versjon);
        self
    }

    /// Replaces the payload
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn at(mut self, tidsstempel: DateTime<Utc>) -> Self {
        self.tidsstempel = tidsstempel;
        self
    }

    /// The submission as a client would send it over the wire
    pub fn json(&self) -> Value {
        let mut body = json!({
            "sak_id": self.sak_id.as_str(),
            "event_type": self.event_type.as_str(),
            "aktor": self.aktor.as_deref().unwrap_or(standard_aktor(self.rolle)),
            "aktor_rolle": self.rolle.as_str(),
            "data": self.data,
        });
        if let Some(versjon) = self.versjon {
            body["versjon"] = json!(versjon);
        }
        body
    }

    /// Builds the submission
    ///
    /// # Panics
    ///
    /// Panics if the payload does not fit the event type
    pub fn submission(self) -> Submission {
        let body = self.json();
        Submission::from_json(body)
            .unwrap_or_else(|e| panic!("invalid {} fixture: {e}", self.event_type))
    }

    /// Builds the event as the store would record it
    pub fn build(self) -> Event {
        let event_id = self.event_id;
        let tidsstempel = self.tidsstempel;
        self.submission().into_event_with(event_id, tidsstempel)
    }
}
