pub mod backend;
pub mod local;
pub mod memory;
pub mod task;

pub use backend::{BackendError, ProgressSink, StorageBackend};
pub use local::LocalStorageBackend;
pub use memory::{FaultPlan, InMemoryStorageBackend};
pub use task::{StoredObject, TransferEvent, TransferHandle, TransferOutcome, TransferTask};
