pub mod record;
pub mod upload;

pub use record::{NewUploadRecord, RecordChange, UploadMetadataRecord};
pub use upload::{
    ActorId, CollectionId, Destination, ItemId, QueueRow, RecordId, SourceFile, TransferStatus,
};
