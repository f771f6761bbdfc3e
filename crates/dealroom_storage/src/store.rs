use anyhow::Result;
use async_trait::async_trait;
use dealroom_contract::{NewUploadRecord, RecordChange, UploadMetadataRecord};
use futures::stream::BoxStream;

/// Persistence for upload records. The upload queue only ever calls
/// `create_record` and `delete_record`; the rest serves document views.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_record(&self, record: NewUploadRecord) -> Result<UploadMetadataRecord>;

    async fn get_record(
        &self,
        collection_id: &str,
        record_id: &str,
    ) -> Result<Option<UploadMetadataRecord>>;

    async fn list_records(&self, collection_id: &str) -> Result<Vec<UploadMetadataRecord>>;

    async fn rename_record(
        &self,
        collection_id: &str,
        record_id: &str,
        name: &str,
    ) -> Result<Option<UploadMetadataRecord>>;

    async fn delete_record(&self, collection_id: &str, record_id: &str) -> Result<bool>;

    fn records_changed(&self, collection_id: &str) -> BoxStream<'static, RecordChange>;
}
