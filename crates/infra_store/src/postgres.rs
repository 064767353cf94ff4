//! PostgreSQL repository
//!
//! Events are stored one row per event in `koe_events`; `koe_streams` holds
//! the version of every case. An append runs in one transaction:
//!
//! 1. advance `koe_streams.version` from the expected to the new version
//!    (`UPDATE ... WHERE version = $expected`, or an insert for a new case)
//! 2. insert the events with consecutive `seq` numbers
//!
//! If step 1 touches no row another writer got there first and the
//! transaction is rolled back with a concurrency conflict. Row locking on
//! `koe_streams` serializes concurrent writers to the same case.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

use core_kernel::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, SakId};
use domain_koe::Event;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::repository::{EventLog, EventRepository};

/// Schema for the event tables
pub const SCHEMA: &str = include_str!("../migrations/20240101_000001_koe_events.sql");

/// Case logs stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    /// Creates a repository on an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the store configuration
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if no `database_url` is set and
    /// `StoreError::ConnectionFailed` if the pool cannot be created.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Configuration("database_url is required for the postgres backend".into()))?;

        info!(max_connections = config.max_connections, "creating event store pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self::new(pool))
    }

    /// Creates the event tables if they do not exist
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("event store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_version(
        conn: &mut sqlx::PgConnection,
        sak_id: &SakId,
    ) -> Result<u64, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM koe_streams WHERE sak_id = $1")
                .bind(sak_id.as_str())
                .fetch_optional(&mut *conn)
                .await?;
        Ok(version.map_or(0, |v| v.max(0) as u64))
    }
}

fn to_i64(sak_id: &SakId, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::corrupt(sak_id, format!("version {value} out of range")))
}

impl DomainPort for PostgresEventRepository {}

#[async_trait]
impl HealthCheckable for PostgresEventRepository {
    /// Performs a simple SELECT 1 query
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::new("postgres-event-repository", AdapterHealth::Healthy, latency_ms),
            Err(e) => HealthCheckResult::new("postgres-event-repository", AdapterHealth::Unhealthy, latency_ms)
                .with_message(format!("Database error: {e}")),
        }
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    #[instrument(skip(self), fields(sak_id = %sak_id))]
    async fn read(&self, sak_id: &SakId) -> Result<EventLog, StoreError> {
        // A single statement sees one snapshot, so the version is the row count
        let envelopes: Vec<Value> =
            sqlx::query_scalar("SELECT envelope FROM koe_events WHERE sak_id = $1 ORDER BY seq")
                .bind(sak_id.as_str())
                .fetch_all(&self.pool)
                .await?;

        let events = envelopes
            .into_iter()
            .map(Event::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = events.len(), "read case log");
        Ok(EventLog::new(events))
    }

    #[instrument(skip(self, events), fields(sak_id = %sak_id, count = events.len()))]
    async fn write(
        &self,
        sak_id: &SakId,
        events: &[Event],
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let new_version = expected_version + events.len() as u64;
        let mut tx = self.pool.begin().await?;

        let advanced = if expected_version == 0 {
            sqlx::query(
                "INSERT INTO koe_streams (sak_id, version) VALUES ($1, $2) ON CONFLICT (sak_id) DO NOTHING",
            )
            .bind(sak_id.as_str())
            .bind(to_i64(sak_id, new_version)?)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "UPDATE koe_streams SET version = $3, updated_at = now() WHERE sak_id = $1 AND version = $2",
            )
            .bind(sak_id.as_str())
            .bind(to_i64(sak_id, expected_version)?)
            .bind(to_i64(sak_id, new_version)?)
            .execute(&mut *tx)
            .await?
        };

        if advanced.rows_affected() != 1 {
            let actual = Self::current_version(&mut tx, sak_id).await?;
            tx.rollback().await?;
            return Err(StoreError::concurrency(sak_id, expected_version, actual));
        }

        for (offset, event) in events.iter().enumerate() {
            let seq = expected_version + offset as u64 + 1;
            sqlx::query(
                "INSERT INTO koe_events (sak_id, seq, event_id, event_type, envelope) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(sak_id.as_str())
            .bind(to_i64(sak_id, seq)?)
            .bind(*event.event_id.as_uuid())
            .bind(event.event_type().as_str())
            .bind(event.to_json()?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(new_version)
    }

    async fn list_saker(&self) -> Result<Vec<SakId>, StoreError> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT sak_id FROM koe_streams WHERE version > 0 ORDER BY sak_id")
                .fetch_all(&self.pool)
                .await?;

        ids.into_iter()
            .map(|id| {
                SakId::new(id.as_str()).map_err(|e| StoreError::Configuration(format!("invalid sak_id '{id}' in koe_streams: {e}")))
            })
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
