pub mod committer;
pub mod config;
pub mod item;
pub mod manager;
pub mod paths;
pub mod projection;

pub use committer::{CommitError, MetadataCommitter};
pub use config::QueueConfig;
pub use item::{ItemError, TransferItem};
pub use manager::{CloseReport, QueueError, QueueManager};
pub use paths::object_path;
pub use projection::{project, project_item, size_label};
