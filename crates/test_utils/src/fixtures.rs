//! Pre-built Test Fixtures
//!
//! Ready-to-use payloads, timestamps and case histories. Fixtures are
//! deterministic so failures are reproducible.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use core_kernel::SakId;
use domain_koe::{project, AktorRolle, Event, EventType, SakState};

use crate::builders::EventBuilder;

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Timestamp of the first event in fixture histories (1 Mar 2024, 08:00 UTC)
    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    /// Timestamp of the n-th event in fixture histories, one minute apart
    pub fn step(n: usize) -> DateTime<Utc> {
        Self::start() + Duration::minutes(n as i64)
    }
}

/// Fixture for case identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn sak_id() -> SakId {
        SakId::new("KOE-2024-001").unwrap()
    }

    pub fn eo_sak_id() -> SakId {
        SakId::new("EO-2024-001").unwrap()
    }

    /// A distinct case id per index, for tests touching many cases
    pub fn sak_id_n(n: usize) -> SakId {
        SakId::new(format!("KOE-{n:04}")).unwrap()
    }
}

/// Fixture for event payloads
pub struct DataFixtures;

impl DataFixtures {
    /// A valid payload for every event type
    pub fn standard(event_type: EventType) -> Value {
        match event_type {
            EventType::SakOpprettet => json!({"sakstittel": "Endret fundamentering akse B"}),
            EventType::GrunnlagOpprettet | EventType::GrunnlagOppdatert => Self::grunnlag(),
            EventType::GrunnlagTrukket
            | EventType::VederlagKravTrukket
            | EventType::FristKravTrukket => json!({"begrunnelse": "Trukket etter møte"}),
            EventType::VederlagKravSendt | EventType::VederlagKravOppdatert => Self::vederlag(),
            EventType::FristKravSendt | EventType::FristKravOppdatert => Self::frist(),
            EventType::ResponsGrunnlag
            | EventType::ResponsVederlag
            | EventType::ResponsFrist => Self::godkjent(),
            EventType::EoOpprettet => json!({"eo_nummer": "EO-001", "beskrivelse": "Samlet endring"}),
            EventType::EoKoeLagtTil | EventType::EoKoeFjernet => json!({"koe_sak_id": "KOE-2024-001"}),
            EventType::EoUtstedt => json!({"eo_nummer": "EO-001", "belop": "150000", "frist_dager": 14}),
            EventType::EoAkseptert => json!({}),
            EventType::EoBestridt => json!({"begrunnelse": "Beløpet dekker ikke riggkostnader"}),
            EventType::EoRevidert => json!({"beskrivelse": "Rigg inkludert", "belop": "180000"}),
        }
    }

    pub fn grunnlag() -> Value {
        json!({
            "tittel": "Uforutsette grunnforhold",
            "hovedkategori": "ENDRING",
            "underkategori": "IRREGULAER_ENDRING",
            "beskrivelse": "Fjell påtruffet på kote +12",
            "dato_oppdaget": "2024-02-20",
            "dato_varslet": "2024-02-21",
            "kontraktsreferanser": ["§23.1", "§25.2"]
        })
    }

    pub fn vederlag() -> Value {
        json!({
            "metode": "ENHETSPRISER",
            "belop_direkte": "150000",
            "rigg_drift_belop": "12000",
            "begrunnelse": "Ekstra sprengning og bortkjøring"
        })
    }

    pub fn frist() -> Value {
        json!({
            "varsel_type": "SPESIFISERT",
            "antall_dager": 14,
            "begrunnelse": "Forsinkelse i grunnarbeider"
        })
    }

    pub fn godkjent() -> Value {
        json!({"resultat": "GODKJENT", "begrunnelse": "Akseptert"})
    }

    pub fn avslatt() -> Value {
        json!({"resultat": "AVSLATT", "begrunnelse": "Forholdet er TEs risiko"})
    }
}

/// A case history under construction
///
/// Events get consecutive timestamps and the conventional role for their type.
///
/// # Example
///
/// ```rust,ignore
/// let events = Scenario::ny(IdFixtures::sak_id())
///     .opprettet()
///     .grunnlag_sendt()
///     .grunnlag_godkjent()
///     .into_events();
/// ```
#[derive(Debug, Clone)]
pub struct Scenario {
    sak_id: SakId,
    events: Vec<Event>,
}

impl Scenario {
    pub fn ny(sak_id: SakId) -> Self {
        Self {
            sak_id,
            events: Vec::new(),
        }
    }

    /// Appends an event with the standard payload for its type
    pub fn med(self, event_type: EventType) -> Self {
        let data = DataFixtures::standard(event_type);
        self.med_data(event_type, data)
    }

    /// Appends an event with the given payload
    pub fn med_data(mut self, event_type: EventType, data: Value) -> Self {
        let event = self.neste(event_type).data(data).build();
        self.events.push(event);
        self
    }

    /// Builder for the event that would come next, not yet appended
    pub fn neste(&self, event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
            .sak(self.sak_id.clone())
            .at(TemporalFixtures::step(self.events.len()))
    }

    pub fn opprettet(self) -> Self {
        self.med(EventType::SakOpprettet)
    }

    pub fn eo_opprettet(self) -> Self {
        self.med_data(
            EventType::SakOpprettet,
            json!({"sakstittel": "Endringsordre 1", "sakstype": "ENDRINGSORDRE"}),
        )
    }

    pub fn grunnlag_sendt(self) -> Self {
        self.med(EventType::GrunnlagOpprettet)
    }

    pub fn grunnlag_godkjent(self) -> Self {
        self.med(EventType::ResponsGrunnlag)
    }

    pub fn vederlag_sendt(self) -> Self {
        self.med(EventType::VederlagKravSendt)
    }

    pub fn vederlag_godkjent(self) -> Self {
        self.med(EventType::ResponsVederlag)
    }

    pub fn frist_sendt(self) -> Self {
        self.med(EventType::FristKravSendt)
    }

    /// A standard case with every track approved, ready for a change order
    pub fn klar_for_eo(sak_id: SakId) -> Self {
        Self::ny(sak_id)
            .opprettet()
            .grunnlag_sendt()
            .grunnlag_godkjent()
            .vederlag_sendt()
            .vederlag_godkjent()
            .frist_sendt()
            .med(EventType::ResponsFrist)
    }

    pub fn sak_id(&self) -> &SakId {
        &self.sak_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn version(&self) -> u64 {
        self.events.len() as u64
    }

    pub fn state(&self) -> SakState {
        project(&self.events)
    }
}

/// The conventional submitting role for an event type
pub fn standard_rolle(event_type: EventType) -> AktorRolle {
    event_type
        .tillatte_roller()
        .first()
        .copied()
        .unwrap_or(AktorRolle::Te)
}
