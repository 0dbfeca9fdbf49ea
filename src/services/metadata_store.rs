//! src/services/metadata_store.rs
//!
//! MetadataStore: the `file_metadata` table in SQLite. Rows are append-only:
//! one insert per successful remote upload, keyed by the remote-assigned
//! resource key. There is no update or delete path.

use crate::models::resource::{NewResource, UploadedResource};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const SELECT_COLUMNS: &str = "SELECT id, resource_type, resource_key, original_name, file_size,
        md5_hash, sha256_hash, upload_time, upload_user_id, feishu_api_response
 FROM file_metadata";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource `{0}` not found")]
    NotFound(String),
    #[error("resource `{0}` already recorded")]
    DuplicateKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct MetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create the table and its indexes if they are missing.
    ///
    /// Every statement is `IF NOT EXISTS`, so this runs on each startup.
    pub async fn migrate(&self) -> StoreResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Insert a freshly uploaded resource and return its local id.
    pub async fn insert(&self, record: &NewResource) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO file_metadata (
                resource_type, resource_key, original_name, file_size, md5_hash,
                sha256_hash, upload_time, upload_user_id, feishu_api_response
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.resource_type)
        .bind(&record.resource_key)
        .bind(&record.original_name)
        .bind(record.file_size)
        .bind(&record.md5_hash)
        .bind(&record.sha256_hash)
        .bind(record.upload_time)
        .bind(record.upload_user_id.as_deref())
        .bind(&record.feishu_api_response)
        .execute(&*self.db)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::DuplicateKey(record.resource_key.clone()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Most recent uploads first.
    pub async fn list_recent(&self, limit: i64) -> StoreResult<Vec<UploadedResource>> {
        let rows = sqlx::query_as::<_, UploadedResource>(&format!(
            "{} ORDER BY upload_time DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_key(&self, resource_key: &str) -> StoreResult<UploadedResource> {
        sqlx::query_as::<_, UploadedResource>(&format!(
            "{} WHERE resource_key = ?",
            SELECT_COLUMNS
        ))
        .bind(resource_key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(resource_key.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM file_metadata")
            .fetch_one(&*self.db)
            .await?;
        Ok(n)
    }

    /// Cheap round trip used by the readiness probe.
    pub async fn ping(&self) -> StoreResult<()> {
        let v = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if v != 1 {
            return Err(StoreError::Sqlx(sqlx::Error::Protocol(format!(
                "unexpected result: {}",
                v
            ))));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
