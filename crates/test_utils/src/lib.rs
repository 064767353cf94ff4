//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures and helpers for the KOE case core
//! test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built payloads, identifiers and case histories
//! - `builders`: Event and submission builders with sensible defaults
//! - `database`: PostgreSQL container management
//! - `assertions`: Assertion helpers for validation results and case state
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
