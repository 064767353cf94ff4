//! KOE Case Service
//!
//! The surface the orchestration layer calls: submit events, read the
//! projected state and read the timeline of a case.
//!
//! # Architecture
//!
//! - **Service**: write and read paths over the event store
//! - **Collaborators**: metadata cache and notification sink ports
//! - **Config**: `KOE__*` environment configuration
//! - **Telemetry**: tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use koe_service::{init_tracing, KoeConfig, KoeService};
//!
//! let config = KoeConfig::from_env()?;
//! init_tracing(&config.log);
//! let service = KoeService::from_config(&config).await?;
//! let outcome = service.submit_json(body, expected_version).await?;
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use collaborators::{
    InMemoryMetadataCache, MetadataCache, NoopNotificationSink, NotificationSink, SakMetadata,
    Tilstandsendring, TracingNotificationSink,
};
pub use config::{KoeConfig, LoggingConfig};
pub use error::ServiceError;
pub use service::{CaseView, EventSummary, KoeService, SubmitOutcome, Timeline};
pub use telemetry::init_tracing;
