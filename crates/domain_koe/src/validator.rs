//! Business rule validation
//!
//! Checks a candidate event against the projected state of its case before it
//! is appended. The validator never mutates state and never fails; a rejection
//! is a [`ValidationResult`] naming the first violated [`Regel`].
//!
//! # Rule resolution
//!
//! 1. Common rules: `ACTOR_ROLE`, then `CASE_EXISTS` / `CASE_NOT_EXISTS`, then
//!    `CASE_NOT_CLOSED` (change-order events are exempt)
//! 2. The ordered chain for the event type, see [`regler_for`]
//!
//! The first failing rule short-circuits.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{Event, EventPayload, EventType, Sakstype, SporType};
use crate::state::{EoStatus, SakState};

/// Named business rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regel {
    ActorRole,
    CaseExists,
    CaseNotExists,
    CaseNotClosed,
    NotAlreadySent,
    NotLocked,
    ActiveClaim,
    GrunnlagRequired,
    RevisionSequence,
    TrackSent,
    RespondsToLatest,
    EoCase,
    EoNotCreated,
    EoCreated,
    EoEditable,
    KoeLinked,
    KoeNotLinked,
    CanIssueEo,
    EoIssued,
    EoDisputed,
}

impl Regel {
    /// Returns the rule name reported to clients
    pub fn as_str(&self) -> &'static str {
        match self {
            Regel::ActorRole => "ACTOR_ROLE",
            Regel::CaseExists => "CASE_EXISTS",
            Regel::CaseNotExists => "CASE_NOT_EXISTS",
            Regel::CaseNotClosed => "CASE_NOT_CLOSED",
            Regel::NotAlreadySent => "NOT_ALREADY_SENT",
            Regel::NotLocked => "NOT_LOCKED",
            Regel::ActiveClaim => "ACTIVE_CLAIM",
            Regel::GrunnlagRequired => "GRUNNLAG_REQUIRED",
            Regel::RevisionSequence => "REVISION_SEQUENCE",
            Regel::TrackSent => "TRACK_SENT",
            Regel::RespondsToLatest => "RESPONDS_TO_LATEST",
            Regel::EoCase => "EO_CASE",
            Regel::EoNotCreated => "EO_NOT_CREATED",
            Regel::EoCreated => "EO_CREATED",
            Regel::EoEditable => "EO_EDITABLE",
            Regel::KoeLinked => "KOE_LINKED",
            Regel::KoeNotLinked => "KOE_NOT_LINKED",
            Regel::CanIssueEo => "CAN_ISSUE_EO",
            Regel::EoIssued => "EO_ISSUED",
            Regel::EoDisputed => "EO_DISPUTED",
        }
    }
}

impl fmt::Display for Regel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one candidate event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the event may be appended
    pub is_valid: bool,
    /// Human-readable reason for a rejection
    pub message: Option<String>,
    /// The first rule that failed
    pub violated_rule: Option<Regel>,
}

impl ValidationResult {
    /// Creates a successful validation result
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            message: None,
            violated_rule: None,
        }
    }

    /// Creates a failed validation result for a rule
    pub fn fail(regel: Regel, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
            violated_rule: Some(regel),
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Returns the ordered type-specific rule chain for an event type
pub fn regler_for(event_type: EventType) -> &'static [Regel] {
    use Regel::*;
    match event_type {
        EventType::SakOpprettet => &[],
        EventType::GrunnlagOpprettet => &[NotAlreadySent, RevisionSequence],
        EventType::GrunnlagOppdatert => &[NotLocked, ActiveClaim, RevisionSequence],
        EventType::GrunnlagTrukket => &[NotLocked, ActiveClaim],
        EventType::VederlagKravSendt | EventType::FristKravSendt => {
            &[GrunnlagRequired, NotAlreadySent, RevisionSequence]
        }
        EventType::VederlagKravOppdatert | EventType::FristKravOppdatert => {
            &[GrunnlagRequired, NotLocked, ActiveClaim, RevisionSequence]
        }
        EventType::VederlagKravTrukket | EventType::FristKravTrukket => &[NotLocked, ActiveClaim],
        EventType::ResponsGrunnlag | EventType::ResponsVederlag | EventType::ResponsFrist => {
            &[TrackSent, NotLocked, RespondsToLatest]
        }
        EventType::EoOpprettet => &[EoCase, EoNotCreated],
        EventType::EoKoeLagtTil => &[EoCase, EoCreated, EoEditable, KoeNotLinked],
        EventType::EoKoeFjernet => &[EoCase, EoCreated, EoEditable, KoeLinked],
        EventType::EoUtstedt => &[CanIssueEo],
        EventType::EoAkseptert | EventType::EoBestridt => &[EoCase, EoIssued],
        EventType::EoRevidert => &[EoCase, EoDisputed],
    }
}

/// Stateless business rule validator
#[derive(Debug, Clone, Copy, Default)]
pub struct KoeValidator;

impl KoeValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates a candidate event against the current case state
    ///
    /// # Arguments
    ///
    /// * `event` - The candidate event
    /// * `state` - Projection of the case log the event would be appended to
    ///
    /// # Returns
    ///
    /// `ValidationResult::ok()` or the first violated rule
    pub fn validate(&self, event: &Event, state: &SakState) -> ValidationResult {
        let event_type = event.event_type();
        let felles = [Regel::ActorRole, Regel::CaseExists, Regel::CaseNotClosed];

        for regel in felles.iter().chain(regler_for(event_type)) {
            if let Err(message) = sjekk(*regel, event, state) {
                // CASE_EXISTS doubles as CASE_NOT_EXISTS for sak_opprettet
                let regel = match (regel, event_type) {
                    (Regel::CaseExists, EventType::SakOpprettet) => Regel::CaseNotExists,
                    _ => *regel,
                };
                debug!(
                    sak_id = %event.sak_id,
                    event_type = %event_type,
                    regel = %regel,
                    "business rule violated"
                );
                return ValidationResult::fail(regel, message);
            }
        }
        ValidationResult::ok()
    }
}

type Sjekk = Result<(), String>;

fn krev(betingelse: bool, melding: impl FnOnce() -> String) -> Sjekk {
    if betingelse {
        Ok(())
    } else {
        Err(melding())
    }
}

fn sjekk(regel: Regel, event: &Event, state: &SakState) -> Sjekk {
    let event_type = event.event_type();
    let spor = event_type.spor();

    match regel {
        Regel::ActorRole => krev(
            event_type.tillatte_roller().contains(&event.aktor_rolle),
            || format!("{} kan ikke sende {}", event.aktor_rolle, event_type),
        ),
        Regel::CaseExists | Regel::CaseNotExists => {
            if event_type == EventType::SakOpprettet {
                krev(!state.er_opprettet(), || "Saken er allerede opprettet".to_string())
            } else {
                krev(state.er_opprettet(), || "Saken er ikke opprettet".to_string())
            }
        }
        Regel::CaseNotClosed => krev(event_type.er_eo() || !state.er_lukket, || {
            "Saken er lukket".to_string()
        }),
        Regel::NotAlreadySent => match spor {
            Some(spor) => krev(!state.spor_status(spor).er_sendt(), || {
                format!("Krav for {spor} er allerede sendt")
            }),
            None => Ok(()),
        },
        Regel::NotLocked => match spor {
            Some(spor) => krev(!state.spor_laast(spor), || format!("Sporet {spor} er låst")),
            None => Ok(()),
        },
        Regel::ActiveClaim => match spor {
            Some(spor) => krev(state.spor_status(spor).er_sendt(), || {
                format!("Det finnes ikke et aktivt krav for {spor}")
            }),
            None => Ok(()),
        },
        Regel::GrunnlagRequired => krev(state.grunnlag.status().er_sendt(), || {
            "Grunnlag må være varslet før krav kan sendes".to_string()
        }),
        Regel::RevisionSequence => match (spor, event.versjon) {
            (Some(spor), Some(versjon)) => match state.spor_versjon(spor).checked_add(1) {
                Some(neste) => krev(versjon == neste, || {
                    format!("Forventet versjon {neste} for {spor}, fikk {versjon}")
                }),
                None => Err(format!("Versjonsnummeret for {spor} er brukt opp")),
            },
            _ => Ok(()),
        },
        Regel::TrackSent => match spor {
            Some(spor) => krev(state.spor_status(spor).er_sendt(), || {
                format!("Det er ikke sendt krav for {spor}")
            }),
            None => Ok(()),
        },
        Regel::RespondsToLatest => match (spor, event.versjon) {
            (Some(spor), Some(versjon)) => {
                let gjeldende = state.spor_versjon(spor);
                krev(versjon == gjeldende, || {
                    format!("Svaret gjelder versjon {versjon}, gjeldende krav er versjon {gjeldende}")
                })
            }
            _ => Ok(()),
        },
        Regel::EoCase => krev(state.sakstype == Sakstype::Endringsordre, || {
            "Hendelsen gjelder kun endringsordresaker".to_string()
        }),
        Regel::EoNotCreated => krev(state.endringsordre.is_none(), || {
            "Endringsordre er allerede opprettet".to_string()
        }),
        Regel::EoCreated => krev(state.endringsordre.is_some(), || {
            "Endringsordre er ikke opprettet".to_string()
        }),
        Regel::EoEditable => krev(
            state.eo_status().is_some_and(|s| s.er_redigerbar()),
            || "Endringsordren kan ikke endres i gjeldende status".to_string(),
        ),
        Regel::KoeLinked | Regel::KoeNotLinked => {
            let (koe_sak_id, skal_vaere_koblet) = match &event.payload {
                EventPayload::EoKoeFjernet(data) => (&data.koe_sak_id, true),
                EventPayload::EoKoeLagtTil(data) => (&data.koe_sak_id, false),
                _ => return Ok(()),
            };
            let koblet = state
                .endringsordre
                .as_ref()
                .is_some_and(|eo| eo.er_koblet(koe_sak_id));
            krev(koblet == skal_vaere_koblet, || {
                if skal_vaere_koblet {
                    format!("KOE {koe_sak_id} er ikke koblet til endringsordren")
                } else {
                    format!("KOE {koe_sak_id} er allerede koblet til endringsordren")
                }
            })
        }
        Regel::CanIssueEo => match state.sakstype {
            Sakstype::Endringsordre => Ok(()),
            Sakstype::Standard => krev(state.kan_utstede_eo && state.endringsordre.is_none(), || {
                "Endringsordre kan ikke utstedes før alle spor er avklart".to_string()
            }),
        },
        Regel::EoIssued => krev(state.eo_status() == Some(EoStatus::Utstedt), || {
            "Endringsordren er ikke utstedt".to_string()
        }),
        Regel::EoDisputed => krev(state.eo_status() == Some(EoStatus::Bestridt), || {
            "Endringsordren er ikke bestridt".to_string()
        }),
    }
}

/// Returns the track a rule failure should be attributed to, if any
pub fn regel_spor(regel: Regel, event_type: EventType) -> Option<SporType> {
    match regel {
        Regel::GrunnlagRequired => Some(SporType::Grunnlag),
        Regel::NotAlreadySent
        | Regel::NotLocked
        | Regel::ActiveClaim
        | Regel::RevisionSequence
        | Regel::TrackSent
        | Regel::RespondsToLatest => event_type.spor(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_type_has_a_chain() {
        for event_type in EventType::ALL {
            let chain = regler_for(event_type);
            assert!(chain.len() <= 4, "{event_type} has {} rules", chain.len());
        }
        assert!(regler_for(EventType::SakOpprettet).is_empty());
    }

    #[test]
    fn test_exhausted_revision_counter_is_rejected() {
        let event = crate::Submission::from_json(serde_json::json!({
            "sak_id": "KOE-1",
            "event_type": "vederlag_krav_oppdatert",
            "aktor": "Tone Entreprenør",
            "aktor_rolle": "TE",
            "versjon": 0,
            "data": {"metode": "ENHETSPRISER", "belop_direkte": "1000"}
        }))
        .unwrap()
        .into_event();
        let mut state = SakState::default();
        state.vederlag.versjon = u32::MAX;

        let result = sjekk(Regel::RevisionSequence, &event, &state);
        assert!(result.unwrap_err().contains("brukt opp"));
    }

    #[test]
    fn test_rule_names_match_serde() {
        let json = serde_json::to_value(Regel::GrunnlagRequired).unwrap();
        assert_eq!(json, serde_json::json!("GRUNNLAG_REQUIRED"));
        assert_eq!(Regel::NotLocked.to_string(), "NOT_LOCKED");
    }

    #[test]
    fn test_validation_result_constructors() {
        assert!(ValidationResult::ok().is_valid);
        let fail = ValidationResult::fail(Regel::EoIssued, "nope");
        assert!(!fail.is_valid);
        assert_eq!(fail.violated_rule, Some(Regel::EoIssued));
    }
}
