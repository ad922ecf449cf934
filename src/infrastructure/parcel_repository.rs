//! SQLite row store for parcels and sync cursors
//!
//! Handles connection/pool management and schema migration the same way for
//! every environment: the database file is created on demand and tables are
//! created idempotently at startup.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::warn;

use crate::domain::cursor::CursorValue;
use crate::domain::parcel::{Parcel, ParcelFragment};
use crate::domain::sync::{ParcelStore, SyncError};

/// sqlx-backed implementation of [`ParcelStore`].
#[derive(Clone)]
pub struct SqliteParcelRepository {
    pool: SqlitePool,
}

impl SqliteParcelRepository {
    /// Connect to the database, creating the file and parent directories if
    /// they do not exist yet.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if !db_path.is_empty() && db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> Result<()> {
        let create_parcels_sql = r#"
            CREATE TABLE IF NOT EXISTS parcels (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                metadata TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                deleted_at DATETIME
            )
        "#;

        let create_cursors_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_cursors (
                kind TEXT PRIMARY KEY,
                last_synced_at INTEGER NOT NULL
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_parcels_missing_metadata
            ON parcels (id) WHERE metadata IS NULL
        "#;

        sqlx::query(create_parcels_sql).execute(&self.pool).await?;
        sqlx::query(create_cursors_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }

    async fn upsert_rows(pool: &SqlitePool, rows: &[ParcelFragment]) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO parcels (id, owner, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    owner = excluded.owner,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(row.id)
            .bind(&row.owner.id)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    fn parcel_from_row(row: &sqlx::sqlite::SqliteRow) -> Parcel {
        Parcel {
            id: row.get("id"),
            owner: row.get("owner"),
            metadata: row.get("metadata"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
            deleted_at: row.get::<Option<DateTime<Utc>>, _>("deleted_at"),
        }
    }
}

#[async_trait]
impl ParcelStore for SqliteParcelRepository {
    async fn get_cursor(&self, kind: &str) -> Result<Option<CursorValue>, SyncError> {
        let row = sqlx::query("SELECT last_synced_at FROM sync_cursors WHERE kind = ?")
            .bind(kind)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::store)?;

        Ok(row.map(|r| r.get::<i64, _>("last_synced_at")))
    }

    async fn set_cursor(&self, kind: &str, value: CursorValue) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (kind, last_synced_at)
            VALUES (?, ?)
            ON CONFLICT(kind) DO UPDATE SET last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(kind)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(SyncError::store)?;
        Ok(())
    }

    async fn upsert_parcels(&self, rows: &[ParcelFragment]) -> Result<(), SyncError> {
        Self::upsert_rows(&self.pool, rows)
            .await
            .map_err(SyncError::store)
    }

    fn insert_parcels_unordered(&self, rows: Vec<ParcelFragment>) {
        if rows.is_empty() {
            return;
        }
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::upsert_rows(&pool, &rows).await {
                warn!("Unordered parcel insert failed: {e}");
            }
        });
    }

    async fn find_missing_metadata(&self) -> Result<Vec<Parcel>, SyncError> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, metadata, created_at, updated_at, deleted_at
            FROM parcels
            WHERE metadata IS NULL AND deleted_at IS NULL
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::store)?;

        Ok(rows.iter().map(Self::parcel_from_row).collect())
    }

    async fn set_metadata(&self, id: i64, raw: &str) -> Result<(), SyncError> {
        sqlx::query("UPDATE parcels SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(raw)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SyncError::store)?;
        Ok(())
    }
}
