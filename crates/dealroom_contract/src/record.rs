use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::upload::{ActorId, CollectionId, RecordId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadMetadataRecord {
    pub record_id: RecordId,
    pub collection_id: CollectionId,
    pub name: String,
    pub destination_folder: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub tags: BTreeSet<String>,
    pub owner_id: ActorId,
    pub storage_location: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a record is first written; id, version and timestamp
/// are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUploadRecord {
    pub collection_id: CollectionId,
    pub name: String,
    pub destination_folder: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub tags: BTreeSet<String>,
    pub owner_id: ActorId,
    pub storage_location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordChange {
    Created { record: UploadMetadataRecord },
    Renamed { record: UploadMetadataRecord },
    Deleted {
        collection_id: CollectionId,
        record_id: RecordId,
    },
}

impl RecordChange {
    pub fn collection_id(&self) -> &str {
        match self {
            Self::Created { record } | Self::Renamed { record } => &record.collection_id,
            Self::Deleted { collection_id, .. } => collection_id,
        }
    }
}
