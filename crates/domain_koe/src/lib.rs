//! KOE Case Domain
//!
//! Event-sourced core of the NS 8407 variation-claim workflow. A case (*sak*)
//! negotiates three independent tracks between the contractor (TE) and the
//! client (BH):
//!
//! - **Grunnlag**: the legal basis of the claim
//! - **Vederlag**: compensation
//! - **Frist**: time extension
//!
//! # Architecture
//!
//! - **Events**: closed set of event variants with a common envelope
//! - **Projector**: pure fold of a case log into [`SakState`]
//! - **Validator**: rule engine gating which events may be appended
//!
//! Persistence lives in `infra_store`; this crate performs no I/O.
//!
//! # Write path
//!
//! ```text
//! Submission -> Event -> project(log) -> validate(event, state) -> append
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_koe::{project, KoeValidator, Submission};
//!
//! let state = project(&events);
//! let candidate = Submission::from_json(body)?.into_event();
//! let result = KoeValidator::new().validate(&candidate, &state);
//! if !result.is_valid {
//!     println!("rejected by {:?}", result.violated_rule);
//! }
//! ```

pub mod error;
pub mod events;
pub mod projector;
pub mod state;
pub mod submission;
pub mod validator;

pub use error::KoeError;
pub use events::{
    AktorRolle, EoAkseptertData, EoBestridtData, EoKoeData, EoOpprettetData, EoRevidertData,
    EoUtstedtData, Event, EventPayload, EventType, FristData, FristResultat, FristVarselType,
    GrunnlagData, GrunnlagResultat, ResponsFristData, ResponsGrunnlagData, ResponsVederlagData,
    SakOpprettetData, Sakstype, SporType, TrukketData, VederlagData, VederlagResultat,
    VederlagsMetode,
};
pub use projector::{project, SakProjector};
pub use state::{
    EoStatus, EoTilstand, FristSpor, GrunnlagSpor, NesteHandling, OverordnetStatus, SakState,
    Spor, SporStatus, VederlagSpor,
};
pub use submission::Submission;
pub use validator::{regel_spor, regler_for, KoeValidator, Regel, ValidationResult};
