use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::info;

use crate::backend::{percent_of, BackendError, ProgressSink, StorageBackend};

pub const MEMORY_SCHEME: &str = "mem://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultPlan {
    /// Reject the transfer once progress reaches `percent`.
    FailAt { percent: u8, reason: String },
    /// Hang once progress reaches `after_percent` until the transfer is dropped.
    Stall { after_percent: u8 },
}

/// Object store kept in process memory, with fault injection keyed on a
/// fragment of the object path.
#[derive(Debug)]
pub struct InMemoryStorageBackend {
    chunk_size: usize,
    chunk_delay: Duration,
    faults: Vec<(String, FaultPlan)>,
    fail_deletes: bool,
    objects: RwLock<HashMap<String, Bytes>>,
    delete_attempts: RwLock<Vec<String>>,
    active: Arc<AtomicUsize>,
}

impl Default for InMemoryStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorageBackend {
    pub fn new() -> Self {
        Self {
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
            faults: Vec::new(),
            fail_deletes: false,
            objects: RwLock::new(HashMap::new()),
            delete_attempts: RwLock::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_delay: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_delay = chunk_delay;
        self
    }

    pub fn with_fault(mut self, path_fragment: impl Into<String>, plan: FaultPlan) -> Self {
        self.faults.push((path_fragment.into(), plan));
        self
    }

    pub fn with_failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub async fn object(&self, location: &str) -> Option<Bytes> {
        self.objects.read().await.get(location).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn delete_attempts(&self) -> Vec<String> {
        self.delete_attempts.read().await.clone()
    }

    /// Number of `put_object` futures currently alive.
    pub fn active_transfers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn fault_for(&self, path: &str) -> Option<&FaultPlan> {
        self.faults
            .iter()
            .find(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, plan)| plan)
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorageBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: Bytes,
        progress: &ProgressSink,
    ) -> Result<String, BackendError> {
        let _active = ActiveGuard::enter(&self.active);
        let plan = self.fault_for(path);
        let total = bytes.len() as u64;
        let mut sent = 0u64;

        loop {
            let percent = percent_of(sent, total);
            match plan {
                Some(FaultPlan::FailAt {
                    percent: at,
                    reason,
                }) if percent >= *at => return Err(BackendError::Rejected(reason.clone())),
                Some(FaultPlan::Stall { after_percent }) if percent >= *after_percent => {
                    std::future::pending::<()>().await;
                }
                _ => {}
            }

            if sent >= total {
                break;
            }

            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            sent = (sent + self.chunk_size as u64).min(total);
            progress.report_bytes(sent, total);
        }

        let location = format!("{MEMORY_SCHEME}{path}");
        self.objects.write().await.insert(location.clone(), bytes);
        Ok(location)
    }

    async fn delete_object(&self, location: &str) -> Result<(), BackendError> {
        self.delete_attempts.write().await.push(location.to_string());
        if self.fail_deletes {
            return Err(BackendError::Unavailable);
        }

        match self.objects.write().await.remove(location) {
            Some(_) => {
                info!(location = %location, "memory object deleted");
                Ok(())
            }
            None => Err(BackendError::NotFound(location.to_string())),
        }
    }
}

struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
