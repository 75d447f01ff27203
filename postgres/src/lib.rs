//! `PostgreSQL` event store implementation for the Courtside booking platform.
//!
//! This crate provides the production implementation of the
//! [`EventStore`] trait from `courtside-core`:
//!
//! - Event persistence with optimistic concurrency: the per-stream version
//!   check runs inside a transaction holding an advisory lock on the
//!   stream, and a `UNIQUE (stream_id, version)` constraint is the final
//!   backstop - two racing slot reservations can never both commit
//! - Connection pooling via sqlx
//! - Embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use courtside_postgres::PostgresEventStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresEventStore::connect("postgres://localhost/courtside").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

use courtside_core::event::SerializedEvent;
use courtside_core::event_store::{EventStore, EventStoreError};
use courtside_core::stream::{StreamId, Version};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Production event store backed by `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect with default pool settings (10 connections, 30s connect
    /// timeout).
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::DatabaseError` if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, EventStoreError> {
        Self::connect_with(url, 10, Duration::from_secs(30)).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::DatabaseError` if the connection fails.
    pub async fn connect_with(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (for health checks and projections).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::DatabaseError` if a migration fails.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))
    }
}

impl EventStore for PostgresEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            // Serialize writers on the same stream for the duration of the
            // transaction. The UNIQUE (stream_id, version) constraint backs
            // this up if the lock is ever bypassed.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(stream_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            let row =
                sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM events WHERE stream_id = $1")
                    .bind(stream_id.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let current: i64 = row
                .try_get("version")
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            #[allow(clippy::cast_sign_loss)]
            let actual = Version::new(current as u64);

            if let Some(expected) = expected_version {
                if expected != actual {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual,
                    });
                }
            }

            let mut version = current;
            for event in events {
                version += 1;
                sqlx::query(
                    "INSERT INTO events (stream_id, version, event_type, data, metadata) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(stream_id.as_str())
                .bind(version)
                .bind(&event.event_type)
                .bind(&event.data)
                .bind(&event.metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            }

            tx.commit()
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            tracing::debug!(
                stream_id = %stream_id,
                version,
                "appended events"
            );

            #[allow(clippy::cast_sign_loss)]
            let new_version = Version::new(version as u64);
            Ok(new_version)
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        let pool = self.pool.clone();
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let from = from_version.map_or(1, |v| v.value() as i64);

            let rows = sqlx::query(
                "SELECT event_type, data, metadata FROM events \
                 WHERE stream_id = $1 AND version >= $2 ORDER BY version ASC",
            )
            .bind(stream_id.as_str())
            .bind(from)
            .fetch_all(&pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            let mut events = Vec::with_capacity(rows.len());
            for row in rows {
                let event_type: String = row
                    .try_get("event_type")
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
                let data: Vec<u8> = row
                    .try_get("data")
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
                let metadata: Option<serde_json::Value> = row
                    .try_get("metadata")
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
                events.push(SerializedEvent::new(event_type, data, metadata));
            }

            Ok(events)
        })
    }

    fn current_version(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row =
                sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM events WHERE stream_id = $1")
                    .bind(stream_id.as_str())
                    .fetch_one(&pool)
                    .await
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let current: i64 = row
                .try_get("version")
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            #[allow(clippy::cast_sign_loss)]
            let version = Version::new(current as u64);
            Ok(version)
        })
    }
}
