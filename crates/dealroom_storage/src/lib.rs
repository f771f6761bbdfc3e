pub mod repository;
pub mod store;

pub use repository::{SqliteMetadataStore, StorageConfig};
pub use store::MetadataStore;
