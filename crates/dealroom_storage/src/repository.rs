use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealroom_contract::{NewUploadRecord, RecordChange, UploadMetadataRecord};
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::MetadataStore;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

const RECORD_COLUMNS: &str = "record_id, collection_id, name, destination_folder, content_type, size_bytes, tags_json, owner_id, storage_location, version, created_at";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
    changes: broadcast::Sender<RecordChange>,
}

#[derive(Debug, Clone, FromRow)]
struct UploadRecordRow {
    record_id: String,
    collection_id: String,
    name: String,
    destination_folder: String,
    content_type: String,
    size_bytes: i64,
    tags_json: String,
    owner_id: String,
    storage_location: String,
    version: i64,
    created_at: String,
}

impl TryFrom<UploadRecordRow> for UploadMetadataRecord {
    type Error = anyhow::Error;

    fn try_from(row: UploadRecordRow) -> Result<Self> {
        let tags: BTreeSet<String> = serde_json::from_str(&row.tags_json)
            .with_context(|| format!("parse tags of record {}", row.record_id))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .with_context(|| format!("parse created_at of record {}", row.record_id))?
            .with_timezone(&Utc);

        Ok(Self {
            record_id: row.record_id,
            collection_id: row.collection_id,
            name: row.name,
            destination_folder: row.destination_folder,
            content_type: row.content_type,
            size_bytes: u64::try_from(row.size_bytes).context("negative size_bytes")?,
            tags,
            owner_id: row.owner_id,
            storage_location: row.storage_location,
            version: u32::try_from(row.version).context("version out of range")?,
            created_at,
        })
    }
}

impl SqliteMetadataStore {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true);

        // every connection to an in-memory URI opens its own empty database
        let max_connections = if uri.contains(":memory:") {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let (changes, _) = broadcast::channel(256);
        let store = Self { pool, changes };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("dealroom sqlite schema ready");
        Ok(())
    }

    fn publish(&self, change: RecordChange) {
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_record(&self, record: NewUploadRecord) -> Result<UploadMetadataRecord> {
        let now = Utc::now().to_rfc3339();
        let record_id = Uuid::now_v7().to_string();
        let tags_json = serde_json::to_string(&record.tags).context("serialize record tags")?;
        let size_bytes = i64::try_from(record.size_bytes).context("size_bytes out of range")?;

        sqlx::query(
            "INSERT INTO upload_records(record_id, collection_id, name, destination_folder, content_type, size_bytes, tags_json, owner_id, storage_location, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&record_id)
        .bind(&record.collection_id)
        .bind(&record.name)
        .bind(&record.destination_folder)
        .bind(&record.content_type)
        .bind(size_bytes)
        .bind(&tags_json)
        .bind(&record.owner_id)
        .bind(&record.storage_location)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert record for {}", record.storage_location))?;

        let created = self
            .get_record(&record.collection_id, &record_id)
            .await?
            .context("record missing after insert")?;

        self.publish(RecordChange::Created {
            record: created.clone(),
        });
        Ok(created)
    }

    async fn get_record(
        &self,
        collection_id: &str,
        record_id: &str,
    ) -> Result<Option<UploadMetadataRecord>> {
        let row = sqlx::query_as::<_, UploadRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM upload_records WHERE collection_id = ? AND record_id = ?"
        ))
        .bind(collection_id)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query record {record_id}"))?;

        row.map(UploadMetadataRecord::try_from).transpose()
    }

    async fn list_records(&self, collection_id: &str) -> Result<Vec<UploadMetadataRecord>> {
        let rows = sqlx::query_as::<_, UploadRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM upload_records WHERE collection_id = ? ORDER BY created_at ASC, record_id ASC"
        ))
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query records of collection {collection_id}"))?;

        rows.into_iter().map(UploadMetadataRecord::try_from).collect()
    }

    async fn rename_record(
        &self,
        collection_id: &str,
        record_id: &str,
        name: &str,
    ) -> Result<Option<UploadMetadataRecord>> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE upload_records SET name = ?, version = version + 1, updated_at = ? WHERE collection_id = ? AND record_id = ?",
        )
        .bind(name)
        .bind(now)
        .bind(collection_id)
        .bind(record_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("rename record {record_id}"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let renamed = self.get_record(collection_id, record_id).await?;
        if let Some(record) = &renamed {
            self.publish(RecordChange::Renamed {
                record: record.clone(),
            });
        }
        Ok(renamed)
    }

    async fn delete_record(&self, collection_id: &str, record_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM upload_records WHERE collection_id = ? AND record_id = ?")
                .bind(collection_id)
                .bind(record_id)
                .execute(&self.pool)
                .await
                .with_context(|| format!("delete record {record_id}"))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.publish(RecordChange::Deleted {
                collection_id: collection_id.to_string(),
                record_id: record_id.to_string(),
            });
        }
        Ok(deleted)
    }

    fn records_changed(&self, collection_id: &str) -> BoxStream<'static, RecordChange> {
        let wanted = collection_id.to_string();
        BroadcastStream::new(self.changes.subscribe())
            .filter_map(move |item| {
                let matched = match item {
                    Ok(change) if change.collection_id() == wanted => Some(change),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(collection_id = %wanted, error = %err, "record change subscriber lagged");
                        None
                    }
                };
                async move { matched }
            })
            .boxed()
    }
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}
