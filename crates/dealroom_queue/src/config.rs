use std::time::Duration;

/// Admission and timeout policy for one upload session.
///
/// The default starts every submitted transfer immediately and never times
/// out, leaving deadlines to the storage backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_concurrent: Option<usize>,
    pub transfer_timeout: Option<Duration>,
}

impl QueueConfig {
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit);
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// A limit of zero means unbounded.
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.max_concurrent.filter(|limit| *limit > 0)
    }
}
