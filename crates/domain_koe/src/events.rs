//! Event model for the KOE case log
//!
//! Every change to a case is an immutable [`Event`]: a flat envelope
//! (`event_id`, `sak_id`, `event_type`, `tidsstempel`, `aktor`, `aktor_rolle`,
//! `versjon`) plus a nested `data` object whose shape is fixed by the
//! `event_type` discriminant.
//!
//! The discriminant set is closed. Reading an event whose `event_type` is not
//! part of [`EventType`] fails with [`KoeError::UnknownEventType`], so the log can
//! never hold an entry the projector and validator do not understand.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors};

use core_kernel::{CoreError, EventId, SakId};

use crate::error::KoeError;

/// Role of the actor submitting an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AktorRolle {
    /// Contractor (totalentreprenør)
    Te,
    /// Client (byggherre)
    Bh,
}

impl AktorRolle {
    pub fn as_str(&self) -> &'static str {
        match self {
            AktorRolle::Te => "TE",
            AktorRolle::Bh => "BH",
        }
    }
}

impl fmt::Display for AktorRolle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three negotiation tracks of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SporType {
    Grunnlag,
    Vederlag,
    Frist,
}

impl SporType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SporType::Grunnlag => "grunnlag",
            SporType::Vederlag => "vederlag",
            SporType::Frist => "frist",
        }
    }
}

impl fmt::Display for SporType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SakOpprettet,
    GrunnlagOpprettet,
    GrunnlagOppdatert,
    GrunnlagTrukket,
    VederlagKravSendt,
    VederlagKravOppdatert,
    VederlagKravTrukket,
    FristKravSendt,
    FristKravOppdatert,
    FristKravTrukket,
    ResponsGrunnlag,
    ResponsVederlag,
    ResponsFrist,
    EoOpprettet,
    EoKoeLagtTil,
    EoKoeFjernet,
    EoUtstedt,
    EoAkseptert,
    EoBestridt,
    EoRevidert,
}

impl EventType {
    /// Every event type, in catalogue order
    pub const ALL: [EventType; 20] = [
        EventType::SakOpprettet,
        EventType::GrunnlagOpprettet,
        EventType::GrunnlagOppdatert,
        EventType::GrunnlagTrukket,
        EventType::VederlagKravSendt,
        EventType::VederlagKravOppdatert,
        EventType::VederlagKravTrukket,
        EventType::FristKravSendt,
        EventType::FristKravOppdatert,
        EventType::FristKravTrukket,
        EventType::ResponsGrunnlag,
        EventType::ResponsVederlag,
        EventType::ResponsFrist,
        EventType::EoOpprettet,
        EventType::EoKoeLagtTil,
        EventType::EoKoeFjernet,
        EventType::EoUtstedt,
        EventType::EoAkseptert,
        EventType::EoBestridt,
        EventType::EoRevidert,
    ];

    /// Returns the wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SakOpprettet => "sak_opprettet",
            EventType::GrunnlagOpprettet => "grunnlag_opprettet",
            EventType::GrunnlagOppdatert => "grunnlag_oppdatert",
            EventType::GrunnlagTrukket => "grunnlag_trukket",
            EventType::VederlagKravSendt => "vederlag_krav_sendt",
            EventType::VederlagKravOppdatert => "vederlag_krav_oppdatert",
            EventType::VederlagKravTrukket => "vederlag_krav_trukket",
            EventType::FristKravSendt => "frist_krav_sendt",
            EventType::FristKravOppdatert => "frist_krav_oppdatert",
            EventType::FristKravTrukket => "frist_krav_trukket",
            EventType::ResponsGrunnlag => "respons_grunnlag",
            EventType::ResponsVederlag => "respons_vederlag",
            EventType::ResponsFrist => "respons_frist",
            EventType::EoOpprettet => "eo_opprettet",
            EventType::EoKoeLagtTil => "eo_koe_lagt_til",
            EventType::EoKoeFjernet => "eo_koe_fjernet",
            EventType::EoUtstedt => "eo_utstedt",
            EventType::EoAkseptert => "eo_akseptert",
            EventType::EoBestridt => "eo_bestridt",
            EventType::EoRevidert => "eo_revidert",
        }
    }

    /// Returns the track this event type mutates, if any
    pub fn spor(&self) -> Option<SporType> {
        match self {
            EventType::GrunnlagOpprettet
            | EventType::GrunnlagOppdatert
            | EventType::GrunnlagTrukket
            | EventType::ResponsGrunnlag => Some(SporType::Grunnlag),
            EventType::VederlagKravSendt
            | EventType::VederlagKravOppdatert
            | EventType::VederlagKravTrukket
            | EventType::ResponsVederlag => Some(SporType::Vederlag),
            EventType::FristKravSendt
            | EventType::FristKravOppdatert
            | EventType::FristKravTrukket
            | EventType::ResponsFrist => Some(SporType::Frist),
            EventType::SakOpprettet
            | EventType::EoOpprettet
            | EventType::EoKoeLagtTil
            | EventType::EoKoeFjernet
            | EventType::EoUtstedt
            | EventType::EoAkseptert
            | EventType::EoBestridt
            | EventType::EoRevidert => None,
        }
    }

    /// Returns true for events of the change-order (EO) sub-lifecycle
    pub fn er_eo(&self) -> bool {
        matches!(
            self,
            EventType::EoOpprettet
                | EventType::EoKoeLagtTil
                | EventType::EoKoeFjernet
                | EventType::EoUtstedt
                | EventType::EoAkseptert
                | EventType::EoBestridt
                | EventType::EoRevidert
        )
    }

    /// Returns true for BH responses
    pub fn er_respons(&self) -> bool {
        matches!(
            self,
            EventType::ResponsGrunnlag | EventType::ResponsVederlag | EventType::ResponsFrist
        )
    }

    /// Roles permitted to submit this event type
    pub fn tillatte_roller(&self) -> &'static [AktorRolle] {
        match self {
            EventType::SakOpprettet => &[AktorRolle::Te, AktorRolle::Bh],
            EventType::GrunnlagOpprettet
            | EventType::GrunnlagOppdatert
            | EventType::GrunnlagTrukket
            | EventType::VederlagKravSendt
            | EventType::VederlagKravOppdatert
            | EventType::VederlagKravTrukket
            | EventType::FristKravSendt
            | EventType::FristKravOppdatert
            | EventType::FristKravTrukket
            | EventType::EoAkseptert
            | EventType::EoBestridt => &[AktorRolle::Te],
            EventType::ResponsGrunnlag
            | EventType::ResponsVederlag
            | EventType::ResponsFrist
            | EventType::EoOpprettet
            | EventType::EoKoeLagtTil
            | EventType::EoKoeFjernet
            | EventType::EoUtstedt
            | EventType::EoRevidert => &[AktorRolle::Bh],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = KoeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KoeError::UnknownEventType(s.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

/// Kind of case
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sakstype {
    /// Ordinary variation claim (KOE)
    #[default]
    Standard,
    /// Change-order case bundling one or more KOE cases
    Endringsordre,
}

/// Payload of `sak_opprettet`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SakOpprettetData {
    #[validate(length(min = 1, max = 500, message = "Sakstittel må være mellom 1 og 500 tegn"))]
    pub sakstittel: String,
    #[serde(default)]
    pub sakstype: Sakstype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prosjekt_id: Option<String>,
}

/// Payload of `grunnlag_opprettet` and `grunnlag_oppdatert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GrunnlagData {
    #[validate(length(min = 1, message = "Tittel kan ikke være tom"))]
    pub tittel: String,
    #[validate(length(min = 1, message = "Hovedkategori må oppgis"))]
    pub hovedkategori: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underkategori: Option<String>,
    #[serde(default)]
    pub beskrivelse: String,
    pub dato_oppdaget: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dato_varslet: Option<NaiveDate>,
    #[serde(default)]
    pub kontraktsreferanser: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endrings_begrunnelse: Option<String>,
}

/// Payload of the `*_trukket` events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TrukketData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begrunnelse: Option<String>,
}

/// Compensation method (NS 8407 §34)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VederlagsMetode {
    /// Unit prices (§34.3); may yield a deduction
    Enhetspriser,
    /// Cost-plus (§34.4); requires a cost estimate
    Regningsarbeid,
    /// Fixed-price offer
    FastprisTilbud,
}

/// Payload of `vederlag_krav_sendt` and `vederlag_krav_oppdatert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_vederlag"))]
pub struct VederlagData {
    pub metode: VederlagsMetode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belop_direkte: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kostnads_overslag: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rigg_drift_belop: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produktivitet_belop: Option<Decimal>,
    #[serde(default)]
    pub begrunnelse: String,
}

impl VederlagData {
    /// Returns the claimed amount: the direct amount, or the estimate for cost-plus
    pub fn krevd_belop(&self) -> Option<Decimal> {
        match self.metode {
            VederlagsMetode::Regningsarbeid => self.kostnads_overslag.or(self.belop_direkte),
            VederlagsMetode::Enhetspriser | VederlagsMetode::FastprisTilbud => self.belop_direkte,
        }
    }
}

fn validate_vederlag(data: &VederlagData) -> Result<(), ValidationError> {
    match data.metode {
        VederlagsMetode::Regningsarbeid if data.kostnads_overslag.is_none() => {
            return Err(field_error(
                "kostnads_overslag",
                "Regningsarbeid krever kostnadsoverslag",
            ));
        }
        VederlagsMetode::Enhetspriser | VederlagsMetode::FastprisTilbud
            if data.belop_direkte.is_none() =>
        {
            return Err(field_error("belop_direkte", "Metoden krever beløp"));
        }
        _ => {}
    }

    // Only unit-price settlement may produce a deduction
    if data.metode != VederlagsMetode::Enhetspriser
        && data.belop_direkte.is_some_and(|b| b.is_sign_negative())
    {
        return Err(field_error(
            "belop_direkte",
            "Negativt beløp er kun tillatt ved enhetspriser",
        ));
    }

    for (field, amount) in [
        ("kostnads_overslag", data.kostnads_overslag),
        ("rigg_drift_belop", data.rigg_drift_belop),
        ("produktivitet_belop", data.produktivitet_belop),
    ] {
        if amount.is_some_and(|a| a.is_sign_negative()) {
            return Err(field_error(field, "Beløpet kan ikke være negativt"));
        }
    }

    Ok(())
}

/// Kind of time-extension notice (NS 8407 §33)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FristVarselType {
    /// Neutral notice; days are specified later
    Noytralt,
    /// Specified claim with a day count
    Spesifisert,
}

/// Payload of `frist_krav_sendt` and `frist_krav_oppdatert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_frist"))]
pub struct FristData {
    pub varsel_type: FristVarselType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antall_dager: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ny_sluttdato: Option<NaiveDate>,
    #[serde(default)]
    pub begrunnelse: String,
}

fn validate_frist(data: &FristData) -> Result<(), ValidationError> {
    if data.varsel_type == FristVarselType::Spesifisert && data.antall_dager.is_none() {
        return Err(field_error(
            "antall_dager",
            "Spesifisert fristkrav krever antall dager",
        ));
    }
    Ok(())
}

/// BH's answer to the legal basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrunnlagResultat {
    Godkjent,
    DelvisGodkjent,
    Avslatt,
    KreverAvklaring,
}

/// Payload of `respons_grunnlag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ResponsGrunnlagData {
    pub resultat: GrunnlagResultat,
    #[serde(default)]
    pub begrunnelse: String,
}

/// BH's answer to a compensation claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VederlagResultat {
    Godkjent,
    DelvisGodkjent,
    Avslatt,
    /// Payment withheld pending documentation (§30.2)
    HolderTilbake,
}

/// Payload of `respons_vederlag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_respons_vederlag"))]
pub struct ResponsVederlagData {
    pub resultat: VederlagResultat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub godkjent_belop: Option<Decimal>,
    #[serde(default)]
    pub begrunnelse: String,
}

fn validate_respons_vederlag(data: &ResponsVederlagData) -> Result<(), ValidationError> {
    if data.resultat == VederlagResultat::DelvisGodkjent && data.godkjent_belop.is_none() {
        return Err(field_error(
            "godkjent_belop",
            "Delvis godkjenning krever godkjent beløp",
        ));
    }
    Ok(())
}

/// BH's answer to a time-extension claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FristResultat {
    Godkjent,
    DelvisGodkjent,
    Avslatt,
    /// BH demands a specified claim (§33.6.2)
    KreverSpesifisering,
}

/// Payload of `respons_frist`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_respons_frist"))]
pub struct ResponsFristData {
    pub resultat: FristResultat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub godkjent_dager: Option<u32>,
    #[serde(default)]
    pub begrunnelse: String,
}

fn validate_respons_frist(data: &ResponsFristData) -> Result<(), ValidationError> {
    if data.resultat == FristResultat::DelvisGodkjent && data.godkjent_dager.is_none() {
        return Err(field_error(
            "godkjent_dager",
            "Delvis godkjenning krever godkjente dager",
        ));
    }
    Ok(())
}

/// Payload of `eo_opprettet`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EoOpprettetData {
    #[validate(length(min = 1, message = "EO-nummer må oppgis"))]
    pub eo_nummer: String,
    #[serde(default)]
    pub beskrivelse: String,
}

/// Payload of `eo_koe_lagt_til` and `eo_koe_fjernet`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EoKoeData {
    pub koe_sak_id: SakId,
}

/// Payload of `eo_utstedt`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct EoUtstedtData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eo_nummer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belop: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frist_dager: Option<i32>,
    #[serde(default)]
    pub beskrivelse: String,
}

/// Payload of `eo_akseptert`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct EoAkseptertData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kommentar: Option<String>,
}

/// Payload of `eo_bestridt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EoBestridtData {
    #[validate(length(min = 1, message = "Bestridelse må begrunnes"))]
    pub begrunnelse: String,
}

/// Payload of `eo_revidert`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct EoRevidertData {
    #[serde(default)]
    pub beskrivelse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belop: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frist_dager: Option<i32>,
}

/// Type-specific payload of an event
///
/// Serializes to the bare `data` object; the discriminant travels in the
/// envelope as `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    SakOpprettet(SakOpprettetData),
    GrunnlagOpprettet(GrunnlagData),
    GrunnlagOppdatert(GrunnlagData),
    GrunnlagTrukket(TrukketData),
    VederlagKravSendt(VederlagData),
    VederlagKravOppdatert(VederlagData),
    VederlagKravTrukket(TrukketData),
    FristKravSendt(FristData),
    FristKravOppdatert(FristData),
    FristKravTrukket(TrukketData),
    ResponsGrunnlag(ResponsGrunnlagData),
    ResponsVederlag(ResponsVederlagData),
    ResponsFrist(ResponsFristData),
    EoOpprettet(EoOpprettetData),
    EoKoeLagtTil(EoKoeData),
    EoKoeFjernet(EoKoeData),
    EoUtstedt(EoUtstedtData),
    EoAkseptert(EoAkseptertData),
    EoBestridt(EoBestridtData),
    EoRevidert(EoRevidertData),
}

impl EventPayload {
    /// Decodes a `data` object for the given discriminant
    ///
    /// # Errors
    ///
    /// Returns `KoeError::Malformed` if the object does not match the payload
    /// shape of `event_type`.
    pub fn from_parts(event_type: EventType, data: Value) -> Result<Self, KoeError> {
        // Payloads whose fields are all optional may be sent without `data`
        let data = if data.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            data
        };

        let payload = match event_type {
            EventType::SakOpprettet => EventPayload::SakOpprettet(decode(event_type, data)?),
            EventType::GrunnlagOpprettet => EventPayload::GrunnlagOpprettet(decode(event_type, data)?),
            EventType::GrunnlagOppdatert => EventPayload::GrunnlagOppdatert(decode(event_type, data)?),
            EventType::GrunnlagTrukket => EventPayload::GrunnlagTrukket(decode(event_type, data)?),
            EventType::VederlagKravSendt => EventPayload::VederlagKravSendt(decode(event_type, data)?),
            EventType::VederlagKravOppdatert => {
                EventPayload::VederlagKravOppdatert(decode(event_type, data)?)
            }
            EventType::VederlagKravTrukket => EventPayload::VederlagKravTrukket(decode(event_type, data)?),
            EventType::FristKravSendt => EventPayload::FristKravSendt(decode(event_type, data)?),
            EventType::FristKravOppdatert => EventPayload::FristKravOppdatert(decode(event_type, data)?),
            EventType::FristKravTrukket => EventPayload::FristKravTrukket(decode(event_type, data)?),
            EventType::ResponsGrunnlag => EventPayload::ResponsGrunnlag(decode(event_type, data)?),
            EventType::ResponsVederlag => EventPayload::ResponsVederlag(decode(event_type, data)?),
            EventType::ResponsFrist => EventPayload::ResponsFrist(decode(event_type, data)?),
            EventType::EoOpprettet => EventPayload::EoOpprettet(decode(event_type, data)?),
            EventType::EoKoeLagtTil => EventPayload::EoKoeLagtTil(decode(event_type, data)?),
            EventType::EoKoeFjernet => EventPayload::EoKoeFjernet(decode(event_type, data)?),
            EventType::EoUtstedt => EventPayload::EoUtstedt(decode(event_type, data)?),
            EventType::EoAkseptert => EventPayload::EoAkseptert(decode(event_type, data)?),
            EventType::EoBestridt => EventPayload::EoBestridt(decode(event_type, data)?),
            EventType::EoRevidert => EventPayload::EoRevidert(decode(event_type, data)?),
        };
        Ok(payload)
    }

    /// Returns the discriminant matching this payload
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::SakOpprettet(_) => EventType::SakOpprettet,
            EventPayload::GrunnlagOpprettet(_) => EventType::GrunnlagOpprettet,
            EventPayload::GrunnlagOppdatert(_) => EventType::GrunnlagOppdatert,
            EventPayload::GrunnlagTrukket(_) => EventType::GrunnlagTrukket,
            EventPayload::VederlagKravSendt(_) => EventType::VederlagKravSendt,
            EventPayload::VederlagKravOppdatert(_) => EventType::VederlagKravOppdatert,
            EventPayload::VederlagKravTrukket(_) => EventType::VederlagKravTrukket,
            EventPayload::FristKravSendt(_) => EventType::FristKravSendt,
            EventPayload::FristKravOppdatert(_) => EventType::FristKravOppdatert,
            EventPayload::FristKravTrukket(_) => EventType::FristKravTrukket,
            EventPayload::ResponsGrunnlag(_) => EventType::ResponsGrunnlag,
            EventPayload::ResponsVederlag(_) => EventType::ResponsVederlag,
            EventPayload::ResponsFrist(_) => EventType::ResponsFrist,
            EventPayload::EoOpprettet(_) => EventType::EoOpprettet,
            EventPayload::EoKoeLagtTil(_) => EventType::EoKoeLagtTil,
            EventPayload::EoKoeFjernet(_) => EventType::EoKoeFjernet,
            EventPayload::EoUtstedt(_) => EventType::EoUtstedt,
            EventPayload::EoAkseptert(_) => EventType::EoAkseptert,
            EventPayload::EoBestridt(_) => EventType::EoBestridt,
            EventPayload::EoRevidert(_) => EventType::EoRevidert,
        }
    }

    /// Checks the payload-level constraints of the discriminant
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let result = match self {
            EventPayload::SakOpprettet(d) => d.validate(),
            EventPayload::GrunnlagOpprettet(d) | EventPayload::GrunnlagOppdatert(d) => d.validate(),
            EventPayload::GrunnlagTrukket(d)
            | EventPayload::VederlagKravTrukket(d)
            | EventPayload::FristKravTrukket(d) => d.validate(),
            EventPayload::VederlagKravSendt(d) | EventPayload::VederlagKravOppdatert(d) => d.validate(),
            EventPayload::FristKravSendt(d) | EventPayload::FristKravOppdatert(d) => d.validate(),
            EventPayload::ResponsGrunnlag(d) => d.validate(),
            EventPayload::ResponsVederlag(d) => d.validate(),
            EventPayload::ResponsFrist(d) => d.validate(),
            EventPayload::EoOpprettet(d) => d.validate(),
            EventPayload::EoKoeLagtTil(d) | EventPayload::EoKoeFjernet(d) => d.validate(),
            EventPayload::EoUtstedt(d) => d.validate(),
            EventPayload::EoAkseptert(d) => d.validate(),
            EventPayload::EoBestridt(d) => d.validate(),
            EventPayload::EoRevidert(d) => d.validate(),
        };
        result.map_err(|errors| to_core_error(self.event_type(), &errors))
    }

    /// One-line human-readable summary used by the timeline
    pub fn sammendrag(&self) -> String {
        match self {
            EventPayload::SakOpprettet(d) => format!("Sak opprettet: {}", d.sakstittel),
            EventPayload::GrunnlagOpprettet(d) => format!("Grunnlag varslet: {}", d.tittel),
            EventPayload::GrunnlagOppdatert(d) => format!("Grunnlag oppdatert: {}", d.tittel),
            EventPayload::GrunnlagTrukket(_) => "Grunnlag trukket".to_string(),
            EventPayload::VederlagKravSendt(d) => format!("Vederlagskrav sendt: {}", belop_tekst(d)),
            EventPayload::VederlagKravOppdatert(d) => {
                format!("Vederlagskrav oppdatert: {}", belop_tekst(d))
            }
            EventPayload::VederlagKravTrukket(_) => "Vederlagskrav trukket".to_string(),
            EventPayload::FristKravSendt(d) => format!("Fristkrav sendt: {}", dager_tekst(d)),
            EventPayload::FristKravOppdatert(d) => format!("Fristkrav oppdatert: {}", dager_tekst(d)),
            EventPayload::FristKravTrukket(_) => "Fristkrav trukket".to_string(),
            EventPayload::ResponsGrunnlag(d) => format!("Svar på grunnlag: {:?}", d.resultat),
            EventPayload::ResponsVederlag(d) => match d.godkjent_belop {
                Some(belop) => format!("Svar på vederlag: {:?} ({belop})", d.resultat),
                None => format!("Svar på vederlag: {:?}", d.resultat),
            },
            EventPayload::ResponsFrist(d) => match d.godkjent_dager {
                Some(dager) => format!("Svar på frist: {:?} ({dager} dager)", d.resultat),
                None => format!("Svar på frist: {:?}", d.resultat),
            },
            EventPayload::EoOpprettet(d) => format!("Endringsordre {} opprettet", d.eo_nummer),
            EventPayload::EoKoeLagtTil(d) => format!("KOE {} lagt til", d.koe_sak_id),
            EventPayload::EoKoeFjernet(d) => format!("KOE {} fjernet", d.koe_sak_id),
            EventPayload::EoUtstedt(d) => match &d.eo_nummer {
                Some(nummer) => format!("Endringsordre {nummer} utstedt"),
                None => "Endringsordre utstedt".to_string(),
            },
            EventPayload::EoAkseptert(_) => "Endringsordre akseptert".to_string(),
            EventPayload::EoBestridt(_) => "Endringsordre bestridt".to_string(),
            EventPayload::EoRevidert(_) => "Endringsordre revidert".to_string(),
        }
    }
}

fn belop_tekst(data: &VederlagData) -> String {
    match data.krevd_belop() {
        Some(belop) => format!("{belop} ({:?})", data.metode),
        None => format!("{:?}", data.metode),
    }
}

fn dager_tekst(data: &FristData) -> String {
    match data.antall_dager {
        Some(dager) => format!("{dager} dager"),
        None => "nøytralt varsel".to_string(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(event_type: EventType, data: Value) -> Result<T, KoeError> {
    serde_json::from_value(data)
        .map_err(|e| KoeError::malformed(format!("invalid data for {event_type}: {e}")))
}

fn field_error(field: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(field);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Collapses validator output into a single field-attributed error
///
/// Schema-level failures carry the field name as their code.
fn to_core_error(event_type: EventType, errors: &ValidationErrors) -> CoreError {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (field, field_errors) in errors.field_errors() {
        for error in field_errors.iter() {
            let name = if field.to_string() == "__all__" {
                error.code.to_string()
            } else {
                field.to_string()
            };
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("invalid value ({})", error.code));
            collected.entry(name).or_insert(message);
        }
    }

    match collected.into_iter().next() {
        Some((field, message)) => CoreError::validation_field(message, field.clone())
            .with_context("event_type", event_type.as_str()),
        None => CoreError::validation(errors.to_string())
            .with_context("event_type", event_type.as_str()),
    }
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// An immutable entry of a case log
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    /// Store-assigned identity
    pub event_id: EventId,
    /// Case the event belongs to
    pub sak_id: SakId,
    /// Store-assigned timestamp
    pub tidsstempel: DateTime<Utc>,
    /// Free-text name of the actor
    pub aktor: String,
    /// Role of the actor
    pub aktor_rolle: AktorRolle,
    /// Per-track revision counter, where relevant
    pub versjon: Option<u32>,
    /// Type-specific payload
    pub payload: EventPayload,
}

impl Event {
    /// Returns the discriminant of the event
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Returns the track this event mutates, if any
    pub fn spor(&self) -> Option<SporType> {
        self.event_type().spor()
    }

    /// Decodes an event read back from storage
    ///
    /// # Errors
    ///
    /// Returns `KoeError::UnknownEventType` for an unrecognised discriminant
    /// and `KoeError::Malformed` for any other decoding failure.
    pub fn from_json(value: Value) -> Result<Self, KoeError> {
        let raw: RawEvent = serde_json::from_value(value)?;
        Event::try_from(raw)
    }

    /// Encodes the event in its persisted form
    ///
    /// # Errors
    ///
    /// Returns `KoeError::Malformed` if serialization fails.
    pub fn to_json(&self) -> Result<Value, KoeError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Event", 8)?;
        state.serialize_field("event_id", &self.event_id)?;
        state.serialize_field("sak_id", &self.sak_id)?;
        state.serialize_field("event_type", self.event_type().as_str())?;
        state.serialize_field("tidsstempel", &self.tidsstempel)?;
        state.serialize_field("aktor", &self.aktor)?;
        state.serialize_field("aktor_rolle", &self.aktor_rolle)?;
        match self.versjon {
            Some(versjon) => state.serialize_field("versjon", &versjon)?,
            None => state.skip_field("versjon")?,
        }
        state.serialize_field("data", &self.payload)?;
        state.end()
    }
}

/// Wire shape of an event before the payload is dispatched on `event_type`
#[derive(Debug, Deserialize)]
struct RawEvent {
    event_id: EventId,
    sak_id: SakId,
    event_type: String,
    tidsstempel: DateTime<Utc>,
    aktor: String,
    aktor_rolle: AktorRolle,
    #[serde(default)]
    versjon: Option<u32>,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawEvent> for Event {
    type Error = KoeError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let event_type: EventType = raw.event_type.parse()?;
        let payload = EventPayload::from_parts(event_type, raw.data)?;
        Ok(Event {
            event_id: raw.event_id,
            sak_id: raw.sak_id,
            tidsstempel: raw.tidsstempel,
            aktor: raw.aktor,
            aktor_rolle: raw.aktor_rolle,
            versjon: raw.versjon,
            payload,
        })
    }
}
