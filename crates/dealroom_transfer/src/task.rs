use std::sync::Arc;
use std::time::Duration;

use dealroom_contract::{ItemId, SourceFile};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{ProgressSink, StorageBackend};

/// Everything the committer needs, so the source file is never read twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub location: String,
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Stored(StoredObject),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress { item_id: ItemId, percent: u8 },
    Finished { item_id: ItemId, outcome: TransferOutcome },
}

impl TransferEvent {
    pub fn item_id(&self) -> &str {
        match self {
            Self::Progress { item_id, .. } | Self::Finished { item_id, .. } => item_id,
        }
    }
}

pub struct TransferTask {
    item_id: ItemId,
    object_path: String,
    file: SourceFile,
    backend: Arc<dyn StorageBackend>,
    timeout: Option<Duration>,
}

impl TransferTask {
    pub fn new(
        item_id: ItemId,
        object_path: String,
        file: SourceFile,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            item_id,
            object_path,
            file,
            backend,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawns the transfer. Every event, including the single `Finished`, is
    /// delivered on `events`; the returned handle is the only way to abort it.
    pub fn start(self, events: UnboundedSender<TransferEvent>) -> TransferHandle {
        let token = CancellationToken::new();
        let handle = TransferHandle {
            item_id: self.item_id.clone(),
            token: token.clone(),
        };
        tokio::spawn(self.run(token, events));
        handle
    }

    async fn run(self, token: CancellationToken, events: UnboundedSender<TransferEvent>) {
        let TransferTask {
            item_id,
            object_path,
            file,
            backend,
            timeout,
        } = self;
        let sink = ProgressSink::new(item_id.clone(), events.clone(), token.clone());

        debug!(
            item_id = %item_id,
            path = %object_path,
            backend = backend.backend_name(),
            size = file.size_bytes(),
            "transfer started"
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => TransferOutcome::Cancelled,
            limit = expire(timeout) => {
                token.cancel();
                TransferOutcome::Failed(format!("transfer timed out after {limit:?}"))
            }
            result = backend.put_object(&object_path, file.bytes.clone(), &sink) => match result {
                Ok(location) => TransferOutcome::Stored(StoredObject {
                    location,
                    name: file.name.clone(),
                    content_type: file.media_type(),
                    size_bytes: file.size_bytes(),
                }),
                Err(error) => TransferOutcome::Failed(error.to_string()),
            },
        };

        if let TransferOutcome::Failed(reason) = &outcome {
            warn!(item_id = %item_id, reason = %reason, "transfer failed");
        }

        let _ = events.send(TransferEvent::Finished { item_id, outcome });
    }
}

async fn expire(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

/// Abort capability for one running transfer. Cancelling consumes it.
#[derive(Debug)]
pub struct TransferHandle {
    item_id: ItemId,
    token: CancellationToken,
}

impl TransferHandle {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn cancel(self) {
        debug!(item_id = %self.item_id, "transfer abort requested");
        self.token.cancel();
    }
}
