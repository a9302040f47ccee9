use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use bizops_notify_core::{
    DirectoryEntry, DirectoryError, DirectoryProvider, RecordStore, StoreError, StoredRecord,
};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to the generic entity record store.
    pub fn records(&self) -> EntityRecordRepository {
        EntityRecordRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to the organisation directory.
    pub fn directory(&self) -> DirectoryRepository {
        DirectoryRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for the `entity_records` table.
#[derive(Clone)]
pub struct EntityRecordRepository {
    pool: SqlitePool,
}

impl EntityRecordRepository {
    /// Inserts one record with a generated id and returns it as stored.
    pub async fn insert(
        &self,
        entity_type: &str,
        fields: Map<String, Value>,
    ) -> Result<StoredRecord, RecordError> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let organization_id = fields
            .get("organization_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let fields_json = serde_json::to_string(&fields).map_err(RecordError::Encode)?;

        sqlx::query(
            "INSERT INTO entity_records (id, entity_type, organization_id, fields_json, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(entity_type)
        .bind(&organization_id)
        .bind(&fields_json)
        .bind(to_rfc3339(created_at))
        .execute(&self.pool)
        .await?;

        Ok(StoredRecord {
            id,
            entity_type: entity_type.to_string(),
            fields,
            created_at,
        })
    }

    /// Lists records of one entity type, optionally scoped to an organisation.
    pub async fn list(
        &self,
        entity_type: &str,
        organization_id: Option<&str>,
    ) -> Result<Vec<StoredRecord>, RecordError> {
        let rows = sqlx::query_as::<_, EntityRecordRow>(
            r#"
SELECT id, entity_type, fields_json, created_at
  FROM entity_records
 WHERE entity_type = ?
   AND (? IS NULL OR organization_id = ?)
 ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(entity_type)
        .bind(organization_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntityRecordRow::into_record).collect()
    }

    /// Counts records of one entity type.
    pub async fn count(&self, entity_type: &str) -> Result<u64, RecordError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_records WHERE entity_type = ?")
            .bind(entity_type)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

#[async_trait]
impl RecordStore for EntityRecordRepository {
    async fn create(
        &self,
        entity_type: &str,
        fields: Map<String, Value>,
    ) -> Result<StoredRecord, StoreError> {
        self.insert(entity_type, fields).await.map_err(|err| {
            warn!(stage = "storage", %entity_type, error = %err, "entity record insert failed");
            StoreError::from(err)
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntityRecordRow {
    id: String,
    entity_type: String,
    fields_json: String,
    created_at: DateTime<Utc>,
}

impl EntityRecordRow {
    fn into_record(self) -> Result<StoredRecord, RecordError> {
        let fields: Map<String, Value> =
            serde_json::from_str(&self.fields_json).map_err(RecordError::Decode)?;
        Ok(StoredRecord {
            id: self.id,
            entity_type: self.entity_type,
            fields,
            created_at: self.created_at,
        })
    }
}

/// Errors raised by the entity record repository.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to encode record fields: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode record fields: {0}")]
    Decode(serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<RecordError> for StoreError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Encode(err) => Self::Rejected(err.to_string()),
            RecordError::Decode(err) => Self::Decode(err.to_string()),
            RecordError::Database(sqlx::Error::Database(db_err)) => {
                Self::Rejected(db_err.to_string())
            }
            RecordError::Database(other) => Self::Unavailable(other.to_string()),
        }
    }
}

/// Repository for the `directory_entries` table.
#[derive(Clone)]
pub struct DirectoryRepository {
    pool: SqlitePool,
}

impl DirectoryRepository {
    /// Inserts or replaces one directory entry for an organisation.
    pub async fn upsert(
        &self,
        organization_id: &str,
        entry: &DirectoryEntry,
    ) -> Result<(), DirectoryStoreError> {
        sqlx::query(
            "INSERT INTO directory_entries (organization_id, id, role, email, user_email, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(organization_id, id) DO UPDATE \
             SET role = excluded.role, \
                 email = excluded.email, \
                 user_email = excluded.user_email, \
                 updated_at = excluded.updated_at",
        )
        .bind(organization_id)
        .bind(&entry.id)
        .bind(&entry.role)
        .bind(&entry.email)
        .bind(&entry.user_email)
        .bind(to_rfc3339(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Loads every entry of an organisation ordered by id.
    pub async fn list(
        &self,
        organization_id: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryStoreError> {
        let rows = sqlx::query_as::<_, DirectoryRow>(
            "SELECT id, role, email, user_email FROM directory_entries \
             WHERE organization_id = ? ORDER BY id",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DirectoryEntry {
                id: row.id,
                role: row.role,
                email: row.email,
                user_email: row.user_email,
            })
            .collect())
    }
}

#[async_trait]
impl DirectoryProvider for DirectoryRepository {
    async fn entries(&self, organization_id: &str) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.list(organization_id)
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DirectoryRow {
    id: String,
    role: Option<String>,
    email: Option<String>,
    user_email: Option<String>,
}

/// Errors that can occur while reading or writing directory entries.
#[derive(Debug, Error)]
pub enum DirectoryStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
