use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dealroom_contract::ItemId;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::task::TransferEvent;

/// 100 is reserved for a committed item, so in-flight progress stops short of it.
pub const MAX_IN_FLIGHT_PERCENT: u8 = 99;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage backend unavailable")]
    Unavailable,
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage consumed by the upload queue.
///
/// A transfer is aborted by dropping the future returned from `put_object`;
/// implementations must not leave a readable object behind in that case.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn put_object(
        &self,
        path: &str,
        bytes: Bytes,
        progress: &ProgressSink,
    ) -> Result<String, BackendError>;

    async fn delete_object(&self, location: &str) -> Result<(), BackendError>;
}

/// Forwards backend progress to the owning queue as monotonic percentages.
#[derive(Debug)]
pub struct ProgressSink {
    item_id: ItemId,
    events: UnboundedSender<TransferEvent>,
    cancel: CancellationToken,
    last: AtomicU8,
}

impl ProgressSink {
    pub(crate) fn new(
        item_id: ItemId,
        events: UnboundedSender<TransferEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            item_id,
            events,
            cancel,
            last: AtomicU8::new(0),
        }
    }

    pub fn report_percent(&self, percent: u8) {
        if self.cancel.is_cancelled() {
            return;
        }

        let percent = percent.min(MAX_IN_FLIGHT_PERCENT);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent <= previous {
            return;
        }

        trace!(item_id = %self.item_id, percent, "transfer progress");
        let _ = self.events.send(TransferEvent::Progress {
            item_id: self.item_id.clone(),
            percent,
        });
    }

    pub fn report_bytes(&self, sent: u64, total: u64) {
        self.report_percent(percent_of(sent, total));
    }
}

pub(crate) fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (sent.min(total).saturating_mul(100) / total) as u8
}
