//! Deployment history store.
//!
//! Entries are appended when a run is accepted and patched when it ends.
//! There is no delete; entries accumulate.

use crate::models::{DeploymentHistoryEntry, DeploymentHistoryUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("deployment history entry {0} not found")]
    NotFound(Uuid),
    #[error("history storage failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All entries, most recent first.
    async fn list(&self) -> Result<Vec<DeploymentHistoryEntry>, StoreError>;

    async fn create(
        &self,
        entry: DeploymentHistoryEntry,
    ) -> Result<DeploymentHistoryEntry, StoreError>;

    /// Fails with `StoreError::NotFound` for an unknown id.
    async fn update(
        &self,
        id: Uuid,
        update: DeploymentHistoryUpdate,
    ) -> Result<DeploymentHistoryEntry, StoreError>;
}

/// Process-local store, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<Vec<DeploymentHistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn list(&self) -> Result<Vec<DeploymentHistoryEntry>, StoreError> {
        let entries = self.entries.read().await;
        // newest insert first among equal start times
        let mut list: Vec<_> = entries.iter().rev().cloned().collect();
        list.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(list)
    }

    async fn create(
        &self,
        entry: DeploymentHistoryEntry,
    ) -> Result<DeploymentHistoryEntry, StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn update(
        &self,
        id: Uuid,
        update: DeploymentHistoryUpdate,
    ) -> Result<DeploymentHistoryEntry, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::NotFound(id))?;
        entry.apply(&update);
        Ok(entry.clone())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    kind: String,
    status: String,
    start_time: DateTime<Utc>,
    duration: Option<i64>,
}

impl TryFrom<HistoryRow> for DeploymentHistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(DeploymentHistoryEntry {
            id: row.id,
            kind: row.kind.parse().map_err(StoreError::Backend)?,
            status: row.status.parse().map_err(StoreError::Backend)?,
            start_time: row.start_time,
            duration: row.duration,
        })
    }
}

/// Postgres-backed store, survives process restarts.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn list(&self) -> Result<Vec<DeploymentHistoryEntry>, StoreError> {
        let query_span = tracing::info_span!("Fetching deployment history");
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, kind, status, start_time, duration
            FROM deployment_history
            ORDER BY start_time DESC
            "#,
        )
        .fetch_all(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to fetch deployment history, error: {:?}", err);
            StoreError::Backend("Could not fetch deployment history".to_string())
        })?;

        rows.into_iter().map(DeploymentHistoryEntry::try_from).collect()
    }

    async fn create(
        &self,
        entry: DeploymentHistoryEntry,
    ) -> Result<DeploymentHistoryEntry, StoreError> {
        let query_span = tracing::info_span!("Saving new deployment history entry");
        sqlx::query(
            r#"
            INSERT INTO deployment_history (id, kind, status, start_time, duration)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(entry.kind.as_str())
        .bind(entry.status.as_str())
        .bind(entry.start_time)
        .bind(entry.duration)
        .execute(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            StoreError::Backend("Failed to insert".to_string())
        })?;

        Ok(entry)
    }

    async fn update(
        &self,
        id: Uuid,
        update: DeploymentHistoryUpdate,
    ) -> Result<DeploymentHistoryEntry, StoreError> {
        let query_span = tracing::info_span!("Updating deployment history entry");
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            UPDATE deployment_history
            SET
                status = COALESCE($2, status),
                duration = COALESCE($3, duration)
            WHERE id = $1
            RETURNING id, kind, status, start_time, duration
            "#,
        )
        .bind(id)
        .bind(update.status.map(|status| status.as_str()))
        .bind(update.duration)
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            StoreError::Backend("Failed to update".to_string())
        })?;

        match row {
            Some(row) => {
                tracing::info!("Deployment history entry {} has been updated", id);
                row.try_into()
            }
            None => Err(StoreError::NotFound(id)),
        }
    }
}
