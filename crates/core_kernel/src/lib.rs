//! Core Kernel - Foundational types for the KOE case core
//!
//! This crate provides the building blocks used across the workspace:
//! - Strongly-typed identifiers for cases and events
//! - A core error type with structured context
//! - Port error and marker traits for hexagonal adapters

pub mod identifiers;
pub mod error;
pub mod ports;

pub use identifiers::{EventId, SakId, SakIdError};
pub use error::{CoreError, ErrorContext};
pub use ports::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};
