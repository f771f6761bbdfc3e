use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dealroom_contract::{Destination, ItemId, QueueRow, SourceFile, UploadMetadataRecord};
use dealroom_storage::MetadataStore;
use dealroom_transfer::{StorageBackend, StoredObject, TransferEvent, TransferTask};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::committer::MetadataCommitter;
use crate::config::QueueConfig;
use crate::item::{CommitAction, FinishAction, ItemError, TransferItem};
use crate::paths::object_path;
use crate::projection::{project, project_item};

const NOTICE_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("upload queue is closed")]
    Closed,
    #[error("destination collection is required")]
    MissingCollection,
    #[error("uploading actor is required")]
    MissingActor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CloseReport {
    pub cancelled: usize,
}

enum Command {
    Submit { items: Vec<TransferItem> },
    Cancel { item_id: ItemId },
    Close { reply: oneshot::Sender<CloseReport> },
}

enum BackgroundDone {
    Committed {
        item_id: ItemId,
        result: Result<UploadMetadataRecord, ItemError>,
    },
    Cleaned,
}

enum QueueMessage {
    Command(Command),
    Released,
    Transfer(TransferEvent),
    Background(Result<BackgroundDone, JoinError>),
}

/// Handle to one upload session.
///
/// All state lives in a single actor task; this handle only sends commands
/// and reads the published projection. Dropping the handle tears the session
/// down exactly like [`QueueManager::close_all`]. Must be created inside a
/// tokio runtime.
pub struct QueueManager {
    commands: mpsc::UnboundedSender<Command>,
    rows: watch::Receiver<Vec<QueueRow>>,
    notices: broadcast::Sender<QueueRow>,
    submitted: AtomicUsize,
    // Held across the closed check and the send, so no submit can be queued
    // behind the close command.
    closed: Mutex<bool>,
}

impl QueueManager {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        store: Arc<dyn MetadataStore>,
        config: QueueConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (rows_tx, rows) = watch::channel(Vec::new());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let actor = QueueActor::new(backend, store, config, events, rows_tx, notices.clone());
        tokio::spawn(actor.run(command_rx, event_rx));

        Self {
            commands,
            rows,
            notices,
            submitted: AtomicUsize::new(0),
            closed: Mutex::new(false),
        }
    }

    /// Queues one item per file and starts them; never waits for a transfer.
    pub fn submit(
        &self,
        files: Vec<SourceFile>,
        destination: Destination,
    ) -> Result<Vec<ItemId>, QueueError> {
        if destination.collection_id.trim().is_empty() {
            return Err(QueueError::MissingCollection);
        }
        if destination.actor_id.trim().is_empty() {
            return Err(QueueError::MissingActor);
        }
        let closed = self.closed_guard();
        if *closed {
            return Err(QueueError::Closed);
        }
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let destination = Arc::new(destination);
        let items: Vec<TransferItem> = files
            .into_iter()
            .map(|file| {
                let item_id = Uuid::now_v7().to_string();
                let path = object_path(&destination, &item_id, &file.name);
                TransferItem::new(item_id, file, destination.clone(), path)
            })
            .collect();
        let item_ids: Vec<ItemId> = items.iter().map(|item| item.id().to_string()).collect();
        let count = items.len();

        self.commands
            .send(Command::Submit { items })
            .map_err(|_| QueueError::Closed)?;
        self.submitted.fetch_add(count, Ordering::SeqCst);
        drop(closed);
        Ok(item_ids)
    }

    /// Fire-and-forget. Unknown or already finished items are ignored.
    pub fn cancel(&self, item_id: &str) {
        let _ = self.commands.send(Command::Cancel {
            item_id: item_id.to_string(),
        });
    }

    /// Cancels every unfinished item once and waits until no transfer or
    /// record write of this session is still running. Later calls return an
    /// empty report.
    pub async fn close_all(&self) -> CloseReport {
        let response = {
            let mut closed = self.closed_guard();
            if *closed {
                return CloseReport::default();
            }
            *closed = true;

            let (reply, response) = oneshot::channel();
            if self.commands.send(Command::Close { reply }).is_err() {
                return CloseReport::default();
            }
            response
        };
        response.await.unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_guard()
    }

    fn closed_guard(&self) -> MutexGuard<'_, bool> {
        self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn rows(&self) -> Vec<QueueRow> {
        self.rows.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<QueueRow>> {
        self.rows.clone()
    }

    /// Every per-item change, in the order it was applied.
    pub fn notices(&self) -> broadcast::Receiver<QueueRow> {
        self.notices.subscribe()
    }

    /// Resolves once every item submitted through this handle is terminal.
    pub async fn settled(&self) -> Vec<QueueRow> {
        let expected = self.submitted.load(Ordering::SeqCst);
        let mut rows = self.rows.clone();
        let outcome = rows
            .wait_for(|rows| {
                rows.len() >= expected && rows.iter().all(|row| row.status.is_terminal())
            })
            .await
            .map(|rows| rows.clone());

        match outcome {
            Ok(rows) => rows,
            Err(_) => self.rows(),
        }
    }
}

struct Closing {
    reply: Option<oneshot::Sender<CloseReport>>,
    report: CloseReport,
}

struct QueueActor {
    items: Vec<TransferItem>,
    index: HashMap<ItemId, usize>,
    waiting: VecDeque<ItemId>,
    running: HashSet<ItemId>,
    backend: Arc<dyn StorageBackend>,
    committer: MetadataCommitter,
    config: QueueConfig,
    events: mpsc::UnboundedSender<TransferEvent>,
    rows: watch::Sender<Vec<QueueRow>>,
    notices: broadcast::Sender<QueueRow>,
    background: JoinSet<BackgroundDone>,
    closing: Option<Closing>,
    dirty: bool,
}

impl QueueActor {
    fn new(
        backend: Arc<dyn StorageBackend>,
        store: Arc<dyn MetadataStore>,
        config: QueueConfig,
        events: mpsc::UnboundedSender<TransferEvent>,
        rows: watch::Sender<Vec<QueueRow>>,
        notices: broadcast::Sender<QueueRow>,
    ) -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            waiting: VecDeque::new(),
            running: HashSet::new(),
            backend,
            committer: MetadataCommitter::new(store),
            config,
            events,
            rows,
            notices,
            background: JoinSet::new(),
            closing: None,
            dirty: false,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<TransferEvent>,
    ) {
        loop {
            let message = tokio::select! {
                command = commands.recv(), if self.closing.is_none() => match command {
                    Some(command) => QueueMessage::Command(command),
                    None => QueueMessage::Released,
                },
                Some(event) = events.recv() => QueueMessage::Transfer(event),
                Some(joined) = self.background.join_next() => QueueMessage::Background(joined),
            };

            self.apply(message);
            self.publish();

            if self.drained() {
                break;
            }
        }

        if let Some(closing) = self.closing.take() {
            info!(cancelled = closing.report.cancelled, "upload queue released");
            if let Some(reply) = closing.reply {
                let _ = reply.send(closing.report);
            }
        }
    }

    fn apply(&mut self, message: QueueMessage) {
        match message {
            QueueMessage::Command(Command::Submit { items }) => self.submit(items),
            QueueMessage::Command(Command::Cancel { item_id }) => self.cancel(&item_id),
            QueueMessage::Command(Command::Close { reply }) => self.begin_close(Some(reply)),
            QueueMessage::Released => self.begin_close(None),
            QueueMessage::Transfer(TransferEvent::Progress { item_id, percent }) => {
                self.progress(&item_id, percent)
            }
            QueueMessage::Transfer(TransferEvent::Finished { item_id, outcome }) => {
                self.running.remove(&item_id);
                if let Some(idx) = self.index.get(&item_id).copied() {
                    match self.items[idx].finish_transfer(outcome) {
                        FinishAction::Commit(stored) => {
                            self.spawn_commit(idx, stored);
                            self.touch(idx);
                        }
                        FinishAction::Discard(location) => {
                            warn!(item_id = %item_id, location = %location, "transfer completed after cancel");
                            self.spawn_discard(location);
                        }
                        FinishAction::Settled => self.touch(idx),
                        FinishAction::Ignored => {}
                    }
                }
                self.admit();
            }
            QueueMessage::Background(Ok(BackgroundDone::Committed { item_id, result })) => {
                let Some(idx) = self.index.get(&item_id).copied() else {
                    return;
                };
                match self.items[idx].finish_commit(result) {
                    CommitAction::Settled => self.touch(idx),
                    CommitAction::Retract(record) => {
                        warn!(item_id = %item_id, record_id = %record.record_id, "record committed after cancel");
                        self.spawn_retract(record);
                    }
                    CommitAction::Ignored => {}
                }
            }
            QueueMessage::Background(Ok(BackgroundDone::Cleaned)) => {}
            QueueMessage::Background(Err(err)) => {
                error!(error = %err, "background upload work aborted");
            }
        }
    }

    fn submit(&mut self, items: Vec<TransferItem>) {
        for item in items {
            let item_id = item.id().to_string();
            debug!(item_id = %item_id, name = %item.file().name, path = %item.object_path(), "item queued");
            self.index.insert(item_id.clone(), self.items.len());
            self.waiting.push_back(item_id);
            self.items.push(item);
            self.touch(self.items.len() - 1);
        }
        self.admit();
    }

    fn cancel(&mut self, item_id: &str) {
        let Some(idx) = self.index.get(item_id).copied() else {
            debug!(item_id = %item_id, "cancel for unknown item ignored");
            return;
        };

        if self.items[idx].cancel() {
            self.waiting.retain(|waiting| waiting != item_id);
            info!(item_id = %item_id, "item cancelled");
            self.touch(idx);
        }
    }

    fn progress(&mut self, item_id: &str, percent: u8) {
        if let Some(idx) = self.index.get(item_id).copied() {
            if self.items[idx].advance(percent) {
                self.touch(idx);
            }
        }
    }

    /// Starts waiting items in submission order while slots are free.
    fn admit(&mut self) {
        while self.has_free_slot() {
            let Some(item_id) = self.waiting.pop_front() else {
                break;
            };
            let Some(idx) = self.index.get(&item_id).copied() else {
                continue;
            };

            let item = &mut self.items[idx];
            let handle = TransferTask::new(
                item_id.clone(),
                item.object_path().to_string(),
                item.file().clone(),
                self.backend.clone(),
            )
            .with_timeout(self.config.transfer_timeout)
            .start(self.events.clone());
            item.begin(handle);

            self.running.insert(item_id);
            self.touch(idx);
        }
    }

    fn has_free_slot(&self) -> bool {
        self.closing.is_none()
            && self
                .config
                .concurrency_limit()
                .map_or(true, |limit| self.running.len() < limit)
    }

    fn begin_close(&mut self, reply: Option<oneshot::Sender<CloseReport>>) {
        self.waiting.clear();

        let mut cancelled = 0;
        for idx in 0..self.items.len() {
            if self.items[idx].cancel() {
                cancelled += 1;
                self.touch(idx);
            }
        }

        info!(
            cancelled,
            running = self.running.len(),
            "upload queue closing"
        );
        self.closing = Some(Closing {
            reply,
            report: CloseReport { cancelled },
        });
    }

    fn drained(&self) -> bool {
        self.closing.is_some() && self.running.is_empty() && self.background.is_empty()
    }

    fn spawn_commit(&mut self, idx: usize, stored: StoredObject) {
        let item = &self.items[idx];
        let item_id = item.id().to_string();
        let destination = item.destination().clone();
        let committer = self.committer.clone();
        let backend = self.backend.clone();

        self.background.spawn(async move {
            let result = committer
                .commit(
                    &destination.collection_id,
                    &stored,
                    &destination.folder,
                    &destination.tags,
                    &destination.actor_id,
                )
                .await;

            match result {
                Ok(record) => BackgroundDone::Committed {
                    item_id,
                    result: Ok(record),
                },
                Err(err) => {
                    error!(item_id = %item_id, error = %err, "record save failed after transfer");
                    discard_orphan(backend.as_ref(), &stored.location).await;
                    BackgroundDone::Committed {
                        item_id,
                        result: Err(ItemError::Commit(format!("{err:#}"))),
                    }
                }
            }
        });
    }

    fn spawn_discard(&mut self, location: String) {
        let backend = self.backend.clone();
        self.background.spawn(async move {
            discard_orphan(backend.as_ref(), &location).await;
            BackgroundDone::Cleaned
        });
    }

    fn spawn_retract(&mut self, record: UploadMetadataRecord) {
        let committer = self.committer.clone();
        let backend = self.backend.clone();
        self.background.spawn(async move {
            if let Err(err) = committer.retract(&record).await {
                error!(
                    record_id = %record.record_id,
                    error = %err,
                    "record of cancelled item left behind; manual reconciliation needed"
                );
            }
            discard_orphan(backend.as_ref(), &record.storage_location).await;
            BackgroundDone::Cleaned
        });
    }

    fn touch(&mut self, idx: usize) {
        self.dirty = true;
        let _ = self.notices.send(project_item(&self.items[idx]));
    }

    fn publish(&mut self) {
        if self.dirty {
            self.rows.send_replace(project(&self.items));
            self.dirty = false;
        }
    }
}

async fn discard_orphan(backend: &dyn StorageBackend, location: &str) {
    match backend.delete_object(location).await {
        Ok(()) => info!(location = %location, "orphaned object removed"),
        Err(err) => error!(
            location = %location,
            error = %err,
            "orphaned object left behind; manual reconciliation needed"
        ),
    }
}
