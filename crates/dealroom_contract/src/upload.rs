use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;
use mime::Mime;
use serde::{Deserialize, Serialize};

pub type ItemId = String;
pub type CollectionId = String;
pub type RecordId = String;
pub type ActorId = String;

/// A file selected for upload. The bytes are shared, never copied per retry.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type,
            bytes: bytes.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Declared content type when it parses as a MIME type, octet-stream otherwise.
    pub fn media_type(&self) -> String {
        self.content_type
            .as_deref()
            .and_then(|raw| raw.trim().parse::<Mime>().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub collection_id: CollectionId,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub actor_id: ActorId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Transferring,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transferring => "transferring",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered line of the upload dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueRow {
    pub item_id: ItemId,
    pub name: String,
    pub size_label: String,
    pub status: TransferStatus,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub can_cancel: bool,
}
