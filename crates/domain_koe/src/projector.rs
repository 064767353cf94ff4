//! State projector
//!
//! Folds an ordered event list into a [`SakState`]. The fold is pure: no I/O,
//! no clock, no cache. Calling it twice on the same list gives equal states.
//!
//! Each event has exactly one reducer and a reducer only touches the track its
//! event belongs to. The one cross-track effect is `eo_utstedt` on a standard
//! case, which freezes every approved track.

use tracing::trace;

use crate::events::{
    Event, EventPayload, FristResultat, GrunnlagResultat, Sakstype, VederlagResultat,
};
use crate::state::{EoStatus, EoTilstand, SakState, SporStatus};

/// Projects event logs into case state
#[derive(Debug, Clone, Copy, Default)]
pub struct SakProjector;

impl SakProjector {
    pub fn new() -> Self {
        Self
    }

    /// Folds the events in log order
    ///
    /// # Arguments
    ///
    /// * `events` - The full log of one case, oldest first
    ///
    /// # Returns
    ///
    /// The projected state; an empty list yields the default state with
    /// every track `IKKE_RELEVANT`.
    pub fn project(&self, events: &[Event]) -> SakState {
        let mut state = SakState::default();
        for event in events {
            apply(&mut state, event);
        }
        state.oppdater_avledet();
        state
    }

    /// Folds `next` on top of an already projected state
    ///
    /// Used to validate the members of a batch against their predecessors.
    /// The result is only as authoritative as `state`.
    pub fn apply(&self, state: &SakState, next: &Event) -> SakState {
        let mut state = state.clone();
        apply(&mut state, next);
        state.oppdater_avledet();
        state
    }
}

/// Folds the events of one case into its state
pub fn project(events: &[Event]) -> SakState {
    SakProjector.project(events)
}

fn apply(state: &mut SakState, event: &Event) {
    let ts = event.tidsstempel;
    trace!(event_type = %event.event_type(), event_id = %event.event_id, "applying event");

    if state.sak_id.is_none() {
        state.sak_id = Some(event.sak_id.clone());
    }
    state.antall_hendelser += 1;
    state.sist_oppdatert = Some(ts);

    match &event.payload {
        EventPayload::SakOpprettet(data) => {
            state.sakstittel = Some(data.sakstittel.clone());
            state.sakstype = data.sakstype;
            state.prosjekt_id = data.prosjekt_id.clone();
            state.opprettet = Some(ts);
            state.opprettet_av = Some(event.aktor.clone());
        }

        EventPayload::GrunnlagOpprettet(data) => {
            state.grunnlag.spor.send(data.clone(), event.versjon, ts);
        }
        EventPayload::GrunnlagOppdatert(data) => {
            state.grunnlag.spor.oppdater(data.clone(), event.versjon, ts);
        }
        EventPayload::GrunnlagTrukket(_) => state.grunnlag.spor.trekk(ts),
        EventPayload::ResponsGrunnlag(data) => {
            let status = match data.resultat {
                GrunnlagResultat::Godkjent => SporStatus::Godkjent,
                GrunnlagResultat::DelvisGodkjent => SporStatus::DelvisGodkjent,
                GrunnlagResultat::Avslatt => SporStatus::Avslatt,
                GrunnlagResultat::KreverAvklaring => SporStatus::UnderBehandling,
            };
            state.grunnlag.spor.besvar(data.clone(), status, ts);
            if data.resultat == GrunnlagResultat::Godkjent {
                state.grunnlag.laast = true;
            }
        }

        EventPayload::VederlagKravSendt(data) => state.vederlag.send(data.clone(), event.versjon, ts),
        EventPayload::VederlagKravOppdatert(data) => {
            state.vederlag.oppdater(data.clone(), event.versjon, ts)
        }
        EventPayload::VederlagKravTrukket(_) => state.vederlag.trekk(ts),
        EventPayload::ResponsVederlag(data) => {
            let status = match data.resultat {
                VederlagResultat::Godkjent => SporStatus::Godkjent,
                VederlagResultat::DelvisGodkjent => SporStatus::DelvisGodkjent,
                VederlagResultat::Avslatt => SporStatus::Avslatt,
                VederlagResultat::HolderTilbake => SporStatus::UnderBehandling,
            };
            state.vederlag.besvar(data.clone(), status, ts);
        }

        EventPayload::FristKravSendt(data) => state.frist.send(data.clone(), event.versjon, ts),
        EventPayload::FristKravOppdatert(data) => {
            state.frist.oppdater(data.clone(), event.versjon, ts)
        }
        EventPayload::FristKravTrukket(_) => state.frist.trekk(ts),
        EventPayload::ResponsFrist(data) => {
            let status = match data.resultat {
                FristResultat::Godkjent => SporStatus::Godkjent,
                FristResultat::DelvisGodkjent => SporStatus::DelvisGodkjent,
                FristResultat::Avslatt => SporStatus::Avslatt,
                FristResultat::KreverSpesifisering => SporStatus::UnderBehandling,
            };
            state.frist.besvar(data.clone(), status, ts);
        }

        EventPayload::EoOpprettet(data) => {
            state.endringsordre = Some(EoTilstand {
                eo_nummer: Some(data.eo_nummer.clone()),
                beskrivelse: data.beskrivelse.clone(),
                sist_oppdatert: Some(ts),
                ..EoTilstand::default()
            });
        }
        EventPayload::EoKoeLagtTil(data) => {
            let eo = state.endringsordre.get_or_insert_with(EoTilstand::default);
            if !eo.er_koblet(&data.koe_sak_id) {
                eo.relaterte_saker.push(data.koe_sak_id.clone());
            }
            eo.sist_oppdatert = Some(ts);
        }
        EventPayload::EoKoeFjernet(data) => {
            let eo = state.endringsordre.get_or_insert_with(EoTilstand::default);
            eo.relaterte_saker.retain(|id| id != &data.koe_sak_id);
            eo.sist_oppdatert = Some(ts);
        }
        EventPayload::EoUtstedt(data) => {
            let eo = state.endringsordre.get_or_insert_with(EoTilstand::default);
            eo.status = EoStatus::Utstedt;
            if data.eo_nummer.is_some() {
                eo.eo_nummer = data.eo_nummer.clone();
            }
            if !data.beskrivelse.is_empty() {
                eo.beskrivelse = data.beskrivelse.clone();
            }
            eo.belop = data.belop.or(eo.belop);
            eo.frist_dager = data.frist_dager.or(eo.frist_dager);
            eo.sist_oppdatert = Some(ts);

            if state.sakstype == Sakstype::Standard {
                state.grunnlag.spor.laas(ts);
                state.grunnlag.laast = true;
                state.vederlag.laas(ts);
                state.frist.laas(ts);
            }
        }
        EventPayload::EoAkseptert(_) => {
            let eo = state.endringsordre.get_or_insert_with(EoTilstand::default);
            eo.status = EoStatus::Akseptert;
            eo.sist_oppdatert = Some(ts);
        }
        EventPayload::EoBestridt(data) => {
            let eo = state.endringsordre.get_or_insert_with(EoTilstand::default);
            eo.status = EoStatus::Bestridt;
            eo.bestridt_begrunnelse = Some(data.begrunnelse.clone());
            eo.sist_oppdatert = Some(ts);
        }
        EventPayload::EoRevidert(data) => {
            let eo = state.endringsordre.get_or_insert_with(EoTilstand::default);
            eo.status = EoStatus::Revidert;
            eo.revisjon = eo.revisjon.saturating_add(1);
            if !data.beskrivelse.is_empty() {
                eo.beskrivelse = data.beskrivelse.clone();
            }
            eo.belop = data.belop.or(eo.belop);
            eo.frist_dager = data.frist_dager.or(eo.frist_dager);
            eo.sist_oppdatert = Some(ts);
        }
    }
}
