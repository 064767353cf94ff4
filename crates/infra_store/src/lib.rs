//! Event Store Infrastructure
//!
//! Append-only, per-case event logs with optimistic concurrency.
//!
//! # Architecture
//!
//! ```text
//! EventStore (per-case lock, version check)
//!      │
//!      ▼
//! EventRepository (read / compare-and-swap write / list)
//!      ├── InMemoryEventRepository
//!      ├── JsonFileEventRepository   <data_dir>/<sak_id>.json
//!      └── PostgresEventRepository   koe_streams + koe_events
//! ```
//!
//! # Invariants
//!
//! - A log's version always equals its number of events
//! - A successful append advances the version by exactly the batch size
//! - Events are never changed or removed once appended
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_store::{open_store, StoreConfig};
//!
//! let store = open_store(&StoreConfig::file("./data")).await?;
//! let log = store.get_events(&sak_id).await?;
//! store.append(event, log.version).await?;
//! ```

pub mod config;
pub mod error;
pub mod event_store;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use config::{StoreBackend, StoreConfig};
pub use error::StoreError;
pub use event_store::{open_repository, open_store, EventStore};
pub use file::JsonFileEventRepository;
pub use memory::InMemoryEventRepository;
pub use postgres::PostgresEventRepository;
pub use repository::{EventLog, EventRepository};
