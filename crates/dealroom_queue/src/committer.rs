use std::collections::BTreeSet;
use std::sync::Arc;

use dealroom_contract::{NewUploadRecord, UploadMetadataRecord};
use dealroom_storage::MetadataStore;
use dealroom_transfer::StoredObject;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Turns a stored object into its collection record. Not idempotent: each
/// call writes a new record.
#[derive(Clone)]
pub struct MetadataCommitter {
    store: Arc<dyn MetadataStore>,
}

impl MetadataCommitter {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub async fn commit(
        &self,
        collection_id: &str,
        stored: &StoredObject,
        folder: &str,
        tags: &BTreeSet<String>,
        actor_id: &str,
    ) -> Result<UploadMetadataRecord, CommitError> {
        let record = self
            .store
            .create_record(NewUploadRecord {
                collection_id: collection_id.to_string(),
                name: stored.name.clone(),
                destination_folder: folder.to_string(),
                content_type: stored.content_type.clone(),
                size_bytes: stored.size_bytes,
                tags: tags.clone(),
                owner_id: actor_id.to_string(),
                storage_location: stored.location.clone(),
            })
            .await?;

        info!(
            record_id = %record.record_id,
            collection_id = %record.collection_id,
            location = %record.storage_location,
            "upload record committed"
        );
        Ok(record)
    }

    pub async fn retract(&self, record: &UploadMetadataRecord) -> Result<bool, CommitError> {
        let deleted = self
            .store
            .delete_record(&record.collection_id, &record.record_id)
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataCommitter;
    use dealroom_storage::{MetadataStore, SqliteMetadataStore, StorageConfig};
    use dealroom_transfer::StoredObject;
    use std::sync::Arc;

    #[tokio::test]
    async fn commit_writes_version_one_record_with_tags() {
        let store = Arc::new(
            SqliteMetadataStore::connect(&StorageConfig {
                sqlite_path: "sqlite::memory:".to_string(),
                max_connections: 1,
            })
            .await
            .expect("connect"),
        );
        let committer = MetadataCommitter::new(store.clone());
        let stored = StoredObject {
            location: "mem://project-9/valuations/id-report.pdf".to_string(),
            name: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 4096,
        };
        let tags = ["valuation".to_string()].into_iter().collect();

        let record = committer
            .commit("project-9", &stored, "valuations", &tags, "investor-3")
            .await
            .expect("commit");

        assert_eq!(record.version, 1);
        assert_eq!(record.name, "report.pdf");
        assert_eq!(record.destination_folder, "valuations");
        assert_eq!(record.owner_id, "investor-3");
        assert_eq!(record.storage_location, stored.location);
        assert!(record.tags.contains("valuation"));

        assert!(committer.retract(&record).await.expect("retract"));
        assert!(store
            .list_records("project-9")
            .await
            .expect("list")
            .is_empty());
    }
}
