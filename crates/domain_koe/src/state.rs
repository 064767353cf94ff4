//! Projected case state
//!
//! [`SakState`] is derived data. It is rebuilt from the event log on every
//! read and is never persisted as the source of truth.
//!
//! # Track lifecycle
//!
//! ```text
//! IKKE_RELEVANT -> SENDT -> UNDER_BEHANDLING -> SENDT
//!                       \-> GODKJENT -> LAAST
//!                       \-> DELVIS_GODKJENT / AVSLATT -> UNDER_FORHANDLING
//!                       \-> TRUKKET
//! ```
//!
//! `UTKAST` belongs to the status domain but is never produced here; drafts
//! live on the client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::SakId;

use crate::events::{
    AktorRolle, FristData, GrunnlagData, ResponsFristData, ResponsGrunnlagData,
    ResponsVederlagData, Sakstype, SporType, VederlagData,
};

/// Status of a single track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SporStatus {
    #[default]
    IkkeRelevant,
    Utkast,
    Sendt,
    UnderBehandling,
    Godkjent,
    DelvisGodkjent,
    Avslatt,
    UnderForhandling,
    Trukket,
    Laast,
}

impl SporStatus {
    pub const ALL: [SporStatus; 10] = [
        SporStatus::IkkeRelevant,
        SporStatus::Utkast,
        SporStatus::Sendt,
        SporStatus::UnderBehandling,
        SporStatus::Godkjent,
        SporStatus::DelvisGodkjent,
        SporStatus::Avslatt,
        SporStatus::UnderForhandling,
        SporStatus::Trukket,
        SporStatus::Laast,
    ];

    /// Returns true for every status except `IKKE_RELEVANT`
    pub fn er_aktiv(&self) -> bool {
        *self != SporStatus::IkkeRelevant
    }

    /// Returns true once a claim has been sent and not withdrawn
    pub fn er_sendt(&self) -> bool {
        matches!(
            self,
            SporStatus::Sendt
                | SporStatus::UnderBehandling
                | SporStatus::Godkjent
                | SporStatus::DelvisGodkjent
                | SporStatus::Avslatt
                | SporStatus::UnderForhandling
                | SporStatus::Laast
        )
    }

    /// Returns true when nothing remains to negotiate on the track
    pub fn er_avklart(&self) -> bool {
        matches!(
            self,
            SporStatus::Godkjent | SporStatus::Laast | SporStatus::Trukket
        )
    }
}

/// State of one negotiation track
///
/// `K` is the claim payload and `R` the response payload of the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spor<K, R> {
    /// Current status
    pub status: SporStatus,
    /// Latest claim values
    pub krav: Option<K>,
    /// Latest response
    pub respons: Option<R>,
    /// Revision counter of the claim
    pub versjon: u32,
    /// Claim revision the latest response answered
    pub besvart_versjon: Option<u32>,
    /// Timestamp of the last event touching the track
    pub sist_oppdatert: Option<DateTime<Utc>>,
}

impl<K, R> Default for Spor<K, R> {
    fn default() -> Self {
        Self {
            status: SporStatus::IkkeRelevant,
            krav: None,
            respons: None,
            versjon: 0,
            besvart_versjon: None,
            sist_oppdatert: None,
        }
    }
}

impl<K, R> Spor<K, R> {
    /// Records a newly sent claim
    pub fn send(&mut self, krav: K, versjon: Option<u32>, tidspunkt: DateTime<Utc>) {
        self.status = SporStatus::Sendt;
        self.versjon = versjon.unwrap_or(self.versjon.saturating_add(1));
        self.krav = Some(krav);
        self.respons = None;
        self.besvart_versjon = None;
        self.sist_oppdatert = Some(tidspunkt);
    }

    /// Records a revised claim
    ///
    /// A revision after a rejection or partial approval reopens negotiation.
    pub fn oppdater(&mut self, krav: K, versjon: Option<u32>, tidspunkt: DateTime<Utc>) {
        self.status = match self.status {
            SporStatus::Avslatt | SporStatus::DelvisGodkjent | SporStatus::UnderForhandling => {
                SporStatus::UnderForhandling
            }
            _ => SporStatus::Sendt,
        };
        self.versjon = versjon.unwrap_or(self.versjon.saturating_add(1));
        self.krav = Some(krav);
        self.sist_oppdatert = Some(tidspunkt);
    }

    /// Records a withdrawal
    pub fn trekk(&mut self, tidspunkt: DateTime<Utc>) {
        self.status = SporStatus::Trukket;
        self.sist_oppdatert = Some(tidspunkt);
    }

    /// Records a response to the current claim revision
    pub fn besvar(&mut self, respons: R, status: SporStatus, tidspunkt: DateTime<Utc>) {
        self.status = status;
        self.respons = Some(respons);
        self.besvart_versjon = Some(self.versjon);
        self.sist_oppdatert = Some(tidspunkt);
    }

    /// Freezes an approved track
    pub fn laas(&mut self, tidspunkt: DateTime<Utc>) {
        if self.status == SporStatus::Godkjent {
            self.status = SporStatus::Laast;
            self.sist_oppdatert = Some(tidspunkt);
        }
    }
}

/// Legal-basis track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrunnlagSpor {
    #[serde(flatten)]
    pub spor: Spor<GrunnlagData, ResponsGrunnlagData>,
    /// Set once BH has approved the basis; no further grunnlag changes are accepted
    pub laast: bool,
}

impl GrunnlagSpor {
    pub fn status(&self) -> SporStatus {
        self.spor.status
    }

    /// Returns true if the basis is frozen by flag or by status
    pub fn er_laast(&self) -> bool {
        self.laast || self.spor.status == SporStatus::Laast
    }
}

/// Compensation track
pub type VederlagSpor = Spor<VederlagData, ResponsVederlagData>;

/// Time-extension track
pub type FristSpor = Spor<FristData, ResponsFristData>;

/// Status of the change order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EoStatus {
    #[default]
    Utkast,
    Utstedt,
    Akseptert,
    Bestridt,
    Revidert,
}

impl EoStatus {
    /// Linked cases may only change while the order is being drafted or revised
    pub fn er_redigerbar(&self) -> bool {
        matches!(self, EoStatus::Utkast | EoStatus::Revidert)
    }
}

/// Change-order sub-state of a case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EoTilstand {
    pub eo_nummer: Option<String>,
    pub status: EoStatus,
    /// KOE cases bundled by this order, in the order they were added
    pub relaterte_saker: Vec<SakId>,
    pub revisjon: u32,
    pub beskrivelse: String,
    pub belop: Option<Decimal>,
    pub frist_dager: Option<i32>,
    pub bestridt_begrunnelse: Option<String>,
    pub sist_oppdatert: Option<DateTime<Utc>>,
}

impl EoTilstand {
    pub fn er_koblet(&self, sak_id: &SakId) -> bool {
        self.relaterte_saker.contains(sak_id)
    }
}

/// Overall case status derived from the three track statuses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverordnetStatus {
    #[default]
    IngenAktiveSpor,
    Omforent,
    LukketTrukket,
    UnderForhandling,
    UnderBehandling,
    VenterPaaSvar,
    Utkast,
    Ukjent,
}

/// Resolves the overall status
///
/// The order of the checks is significant: agreement is decided before
/// negotiation, and negotiation before pending review.
pub fn beregn_overordnet_status(spor: [SporStatus; 3]) -> OverordnetStatus {
    let aktive: Vec<SporStatus> = spor.into_iter().filter(SporStatus::er_aktiv).collect();

    if aktive.is_empty() {
        return OverordnetStatus::IngenAktiveSpor;
    }
    if aktive
        .iter()
        .all(|s| matches!(s, SporStatus::Godkjent | SporStatus::Laast))
    {
        return OverordnetStatus::Omforent;
    }
    if aktive.iter().all(|s| *s == SporStatus::Trukket) {
        return OverordnetStatus::LukketTrukket;
    }
    if aktive.iter().any(|s| {
        matches!(
            s,
            SporStatus::UnderForhandling | SporStatus::DelvisGodkjent | SporStatus::Avslatt
        )
    }) {
        return OverordnetStatus::UnderForhandling;
    }
    if aktive.contains(&SporStatus::UnderBehandling) {
        return OverordnetStatus::UnderBehandling;
    }
    if aktive.contains(&SporStatus::Sendt) {
        return OverordnetStatus::VenterPaaSvar;
    }
    if aktive.iter().all(|s| *s == SporStatus::Utkast) {
        return OverordnetStatus::Utkast;
    }
    OverordnetStatus::Ukjent
}

/// Returns true if a change order can be issued for the given track statuses
pub fn beregn_kan_utstede_eo(grunnlag: SporStatus, vederlag: SporStatus, frist: SporStatus) -> bool {
    matches!(grunnlag, SporStatus::Godkjent | SporStatus::Laast)
        && [vederlag, frist]
            .iter()
            .filter(|s| s.er_aktiv())
            .all(|s| matches!(s, SporStatus::Godkjent | SporStatus::Laast | SporStatus::Trukket))
}

/// Next-action hint for the parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NesteHandling {
    /// Who is expected to act, if anyone
    pub rolle: Option<AktorRolle>,
    /// Track the action concerns
    pub spor: Option<SporType>,
    pub handling: String,
}

impl NesteHandling {
    fn ny(rolle: AktorRolle, spor: Option<SporType>, handling: &str) -> Self {
        Self {
            rolle: Some(rolle),
            spor,
            handling: handling.to_string(),
        }
    }

    fn ingen() -> Self {
        Self {
            rolle: None,
            spor: None,
            handling: "Ingen ventende handling".to_string(),
        }
    }
}

impl Default for NesteHandling {
    fn default() -> Self {
        Self::ingen()
    }
}

/// Aggregate case state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SakState {
    /// Case the state was folded from; `None` for an empty log
    pub sak_id: Option<SakId>,
    pub sakstittel: Option<String>,
    pub sakstype: Sakstype,
    pub prosjekt_id: Option<String>,
    /// Timestamp of `sak_opprettet`
    pub opprettet: Option<DateTime<Utc>>,
    pub opprettet_av: Option<String>,

    pub grunnlag: GrunnlagSpor,
    pub vederlag: VederlagSpor,
    pub frist: FristSpor,

    /// Change-order sub-state, present once an order is created or issued
    pub endringsordre: Option<EoTilstand>,

    // Derived
    pub overordnet_status: OverordnetStatus,
    pub kan_utstede_eo: bool,
    pub er_lukket: bool,
    pub neste_handling: NesteHandling,

    pub antall_hendelser: usize,
    pub sist_oppdatert: Option<DateTime<Utc>>,
}

impl SakState {
    /// Returns true once `sak_opprettet` has been folded
    pub fn er_opprettet(&self) -> bool {
        self.opprettet.is_some()
    }

    /// Returns the status of the given track
    pub fn spor_status(&self, spor: SporType) -> SporStatus {
        match spor {
            SporType::Grunnlag => self.grunnlag.spor.status,
            SporType::Vederlag => self.vederlag.status,
            SporType::Frist => self.frist.status,
        }
    }

    /// Returns the claim revision of the given track
    pub fn spor_versjon(&self, spor: SporType) -> u32 {
        match spor {
            SporType::Grunnlag => self.grunnlag.spor.versjon,
            SporType::Vederlag => self.vederlag.versjon,
            SporType::Frist => self.frist.versjon,
        }
    }

    /// Returns true if the given track accepts no further changes
    pub fn spor_laast(&self, spor: SporType) -> bool {
        match spor {
            SporType::Grunnlag => self.grunnlag.er_laast(),
            SporType::Vederlag => self.vederlag.status == SporStatus::Laast,
            SporType::Frist => self.frist.status == SporStatus::Laast,
        }
    }

    /// Returns the status of the change order, if one exists
    pub fn eo_status(&self) -> Option<EoStatus> {
        self.endringsordre.as_ref().map(|eo| eo.status)
    }

    /// Recomputes every derived field from the track statuses
    pub fn oppdater_avledet(&mut self) {
        let statuser = [
            self.grunnlag.spor.status,
            self.vederlag.status,
            self.frist.status,
        ];
        self.overordnet_status = beregn_overordnet_status(statuser);
        self.kan_utstede_eo = beregn_kan_utstede_eo(statuser[0], statuser[1], statuser[2]);
        self.er_lukket = self.overordnet_status == OverordnetStatus::LukketTrukket
            || (self.sakstype == Sakstype::Standard
                && self.eo_status().is_some_and(|s| s != EoStatus::Utkast));
        self.neste_handling = self.beregn_neste_handling();
    }

    fn beregn_neste_handling(&self) -> NesteHandling {
        if !self.er_opprettet() {
            return NesteHandling {
                rolle: None,
                spor: None,
                handling: "Opprett sak".to_string(),
            };
        }

        if self.sakstype == Sakstype::Endringsordre {
            return match self.eo_status() {
                None => NesteHandling::ny(AktorRolle::Bh, None, "BH må opprette endringsordren"),
                Some(EoStatus::Utkast) | Some(EoStatus::Revidert) => {
                    NesteHandling::ny(AktorRolle::Bh, None, "BH må utstede endringsordren")
                }
                Some(EoStatus::Utstedt) => NesteHandling::ny(
                    AktorRolle::Te,
                    None,
                    "TE må akseptere eller bestride endringsordren",
                ),
                Some(EoStatus::Bestridt) => {
                    NesteHandling::ny(AktorRolle::Bh, None, "BH må revidere endringsordren")
                }
                Some(EoStatus::Akseptert) => NesteHandling::ingen(),
            };
        }

        if self.er_lukket {
            return NesteHandling::ingen();
        }

        let spor = [
            (SporType::Grunnlag, self.grunnlag.spor.status),
            (SporType::Vederlag, self.vederlag.status),
            (SporType::Frist, self.frist.status),
        ];
        for (type_, status) in spor {
            if let Some(handling) = neste_for_spor(type_, status) {
                return handling;
            }
        }

        if self.kan_utstede_eo && self.endringsordre.is_none() {
            return NesteHandling::ny(AktorRolle::Bh, None, "BH kan utstede endringsordre");
        }
        NesteHandling::ingen()
    }
}

fn neste_for_spor(spor: SporType, status: SporStatus) -> Option<NesteHandling> {
    let (rolle, handling) = match (spor, status) {
        (SporType::Grunnlag, SporStatus::IkkeRelevant | SporStatus::Utkast) => {
            (AktorRolle::Te, "TE må varsle grunnlag")
        }
        (_, SporStatus::IkkeRelevant) => return None,
        (_, SporStatus::Utkast) => (AktorRolle::Te, "TE må sende kravet"),
        (_, SporStatus::Sendt | SporStatus::UnderForhandling) => {
            (AktorRolle::Bh, "BH må behandle kravet")
        }
        (_, SporStatus::UnderBehandling) => (AktorRolle::Te, "TE må avklare eller spesifisere kravet"),
        (_, SporStatus::DelvisGodkjent | SporStatus::Avslatt) => {
            (AktorRolle::Te, "TE må revidere eller trekke kravet")
        }
        (_, SporStatus::Godkjent | SporStatus::Laast | SporStatus::Trukket) => return None,
    };
    Some(NesteHandling::ny(rolle, Some(spor), handling))
}
