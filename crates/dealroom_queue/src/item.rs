use std::sync::Arc;

use dealroom_contract::{Destination, ItemId, SourceFile, TransferStatus, UploadMetadataRecord};
use dealroom_transfer::backend::MAX_IN_FLIGHT_PERCENT;
use dealroom_transfer::{StoredObject, TransferHandle, TransferOutcome};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("{0}")]
    Transfer(String),
    #[error("transfer succeeded, record save failed: {0}")]
    Commit(String),
}

impl ItemError {
    pub(crate) fn transfer(reason: String) -> Self {
        if reason.trim().is_empty() {
            Self::Transfer("transfer failed".to_string())
        } else {
            Self::Transfer(reason)
        }
    }
}

/// Lifecycle of one item. The abort handle only exists while bytes move, and
/// `Committing` projects as `transferring` so no terminal state is ever left.
#[derive(Debug)]
pub(crate) enum ItemPhase {
    Pending,
    Transferring { handle: TransferHandle },
    Committing,
    Succeeded { record: UploadMetadataRecord },
    Failed { error: ItemError },
    Cancelled,
}

pub(crate) enum FinishAction {
    Commit(StoredObject),
    Discard(String),
    Settled,
    Ignored,
}

pub(crate) enum CommitAction {
    Retract(UploadMetadataRecord),
    Settled,
    Ignored,
}

#[derive(Debug)]
pub struct TransferItem {
    id: ItemId,
    file: SourceFile,
    destination: Arc<Destination>,
    object_path: String,
    progress: u8,
    phase: ItemPhase,
}

impl TransferItem {
    pub(crate) fn new(
        id: ItemId,
        file: SourceFile,
        destination: Arc<Destination>,
        object_path: String,
    ) -> Self {
        Self {
            id,
            file,
            destination,
            object_path,
            progress: 0,
            phase: ItemPhase::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn destination(&self) -> &Arc<Destination> {
        &self.destination
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn status(&self) -> TransferStatus {
        match self.phase {
            ItemPhase::Pending => TransferStatus::Pending,
            ItemPhase::Transferring { .. } | ItemPhase::Committing => TransferStatus::Transferring,
            ItemPhase::Succeeded { .. } => TransferStatus::Succeeded,
            ItemPhase::Failed { .. } => TransferStatus::Failed,
            ItemPhase::Cancelled => TransferStatus::Cancelled,
        }
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&ItemError> {
        match &self.phase {
            ItemPhase::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<&UploadMetadataRecord> {
        match &self.phase {
            ItemPhase::Succeeded { record } => Some(record),
            _ => None,
        }
    }

    pub(crate) fn begin(&mut self, handle: TransferHandle) {
        if matches!(self.phase, ItemPhase::Pending) {
            self.phase = ItemPhase::Transferring { handle };
        } else {
            handle.cancel();
        }
    }

    pub(crate) fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(MAX_IN_FLIGHT_PERCENT);
        if !matches!(self.phase, ItemPhase::Transferring { .. }) || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    /// Returns true when the item moved to `cancelled`; terminal items are untouched.
    pub(crate) fn cancel(&mut self) -> bool {
        match std::mem::replace(&mut self.phase, ItemPhase::Cancelled) {
            ItemPhase::Pending | ItemPhase::Committing => true,
            ItemPhase::Transferring { handle } => {
                handle.cancel();
                true
            }
            terminal => {
                self.phase = terminal;
                false
            }
        }
    }

    pub(crate) fn finish_transfer(&mut self, outcome: TransferOutcome) -> FinishAction {
        let transferring = matches!(self.phase, ItemPhase::Transferring { .. });
        let cancelled = matches!(self.phase, ItemPhase::Cancelled);

        match outcome {
            TransferOutcome::Stored(stored) if transferring => {
                self.progress = MAX_IN_FLIGHT_PERCENT;
                self.phase = ItemPhase::Committing;
                FinishAction::Commit(stored)
            }
            TransferOutcome::Stored(stored) if cancelled => FinishAction::Discard(stored.location),
            TransferOutcome::Failed(reason) if transferring => {
                self.phase = ItemPhase::Failed {
                    error: ItemError::transfer(reason),
                };
                FinishAction::Settled
            }
            TransferOutcome::Cancelled if transferring => {
                self.phase = ItemPhase::Cancelled;
                FinishAction::Settled
            }
            _ => FinishAction::Ignored,
        }
    }

    pub(crate) fn finish_commit(
        &mut self,
        result: Result<UploadMetadataRecord, ItemError>,
    ) -> CommitAction {
        let committing = matches!(self.phase, ItemPhase::Committing);
        let cancelled = matches!(self.phase, ItemPhase::Cancelled);

        match result {
            Ok(record) if committing => {
                self.progress = 100;
                self.phase = ItemPhase::Succeeded { record };
                CommitAction::Settled
            }
            Err(error) if committing => {
                self.phase = ItemPhase::Failed { error };
                CommitAction::Settled
            }
            Ok(record) if cancelled => CommitAction::Retract(record),
            _ => CommitAction::Ignored,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CommitAction, FinishAction, ItemError, TransferItem};
    use dealroom_contract::{Destination, SourceFile, TransferStatus, UploadMetadataRecord};
    use dealroom_transfer::{
        FaultPlan, InMemoryStorageBackend, StoredObject, TransferHandle, TransferOutcome,
        TransferTask,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;

    pub(crate) fn pending_item(name: &str, size: usize) -> TransferItem {
        let destination = Arc::new(Destination {
            collection_id: "project-1".to_string(),
            folder: "docs".to_string(),
            tags: Default::default(),
            actor_id: "buyer-1".to_string(),
        });
        TransferItem::new(
            format!("id-{name}"),
            SourceFile::new(name, None, vec![0u8; size]),
            destination,
            format!("project-1/docs/id-{name}"),
        )
    }

    /// A live handle for a transfer that never completes on its own.
    pub(crate) fn stalled_handle() -> TransferHandle {
        let backend = Arc::new(
            InMemoryStorageBackend::new().with_fault("", FaultPlan::Stall { after_percent: 0 }),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        TransferTask::new(
            "stalled".to_string(),
            "stalled".to_string(),
            SourceFile::new("stalled", None, "x"),
            backend,
        )
        .start(tx)
    }

    pub(crate) fn stored(location: &str) -> StoredObject {
        StoredObject {
            location: location.to_string(),
            name: "deed.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 10,
        }
    }

    pub(crate) fn record(location: &str) -> UploadMetadataRecord {
        UploadMetadataRecord {
            record_id: "rec-1".to_string(),
            collection_id: "project-1".to_string(),
            name: "deed.pdf".to_string(),
            destination_folder: "docs".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 10,
            tags: Default::default(),
            owner_id: "buyer-1".to_string(),
            storage_location: location.to_string(),
            version: 1,
            created_at: Default::default(),
        }
    }

    #[tokio::test]
    async fn success_path_reaches_one_hundred_only_after_commit() {
        let mut item = pending_item("deed.pdf", 10);
        item.begin(stalled_handle());
        assert!(item.advance(40));
        assert!(!item.advance(30));
        assert!(item.advance(100));
        assert_eq!(item.progress_percent(), 99);

        assert!(matches!(
            item.finish_transfer(TransferOutcome::Stored(stored("mem://a"))),
            FinishAction::Commit(_)
        ));
        assert_eq!(item.status(), TransferStatus::Transferring);
        assert_eq!(item.progress_percent(), 99);

        assert!(matches!(
            item.finish_commit(Ok(record("mem://a"))),
            CommitAction::Settled
        ));
        assert_eq!(item.status(), TransferStatus::Succeeded);
        assert_eq!(item.progress_percent(), 100);
        assert!(item.record().is_some());
    }

    #[tokio::test]
    async fn terminal_items_ignore_cancel_and_late_events() {
        let mut item = pending_item("deed.pdf", 10);
        item.begin(stalled_handle());
        item.finish_transfer(TransferOutcome::Failed("disk full".to_string()));

        assert!(!item.cancel());
        assert!(!item.advance(50));
        assert!(matches!(
            item.finish_transfer(TransferOutcome::Cancelled),
            FinishAction::Ignored
        ));
        assert_eq!(item.status(), TransferStatus::Failed);
        assert_eq!(
            item.error(),
            Some(&ItemError::Transfer("disk full".to_string()))
        );
    }

    #[tokio::test]
    async fn cancel_races_are_compensated() {
        let mut item = pending_item("deed.pdf", 10);
        item.begin(stalled_handle());
        assert!(item.cancel());
        assert!(matches!(
            item.finish_transfer(TransferOutcome::Stored(stored("mem://late"))),
            FinishAction::Discard(location) if location == "mem://late"
        ));

        let mut committing = pending_item("plan.pdf", 10);
        committing.begin(stalled_handle());
        committing.finish_transfer(TransferOutcome::Stored(stored("mem://b")));
        assert!(committing.cancel());
        assert!(matches!(
            committing.finish_commit(Ok(record("mem://b"))),
            CommitAction::Retract(_)
        ));
        assert_eq!(committing.status(), TransferStatus::Cancelled);
        assert!(committing.error().is_none());
    }

    #[test]
    fn commit_error_message_is_distinct() {
        let commit = ItemError::Commit("database is locked".to_string());
        let transfer = ItemError::transfer(String::new());

        assert_eq!(
            commit.to_string(),
            "transfer succeeded, record save failed: database is locked"
        );
        assert_eq!(transfer.to_string(), "transfer failed");
    }
}
