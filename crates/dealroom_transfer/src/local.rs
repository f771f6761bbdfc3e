use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::backend::{BackendError, ProgressSink, StorageBackend};

pub const LOCAL_SCHEME: &str = "file://";

const WRITE_CHUNK: usize = 256 * 1024;

/// Stores objects below a root directory. Bytes land in a `.part` sibling and
/// are renamed into place only once fully written.
#[derive(Debug, Clone)]
pub struct LocalStorageBackend {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalStorageBackend {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            chunk_size: WRITE_CHUNK,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if escapes || key.trim().is_empty() {
            return Err(BackendError::Rejected(format!("invalid object path: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: Bytes,
        progress: &ProgressSink,
    ) -> Result<String, BackendError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial_name = OsString::from(target.as_os_str());
        partial_name.push(".part");
        let mut partial = PartialFile::new(PathBuf::from(partial_name));

        let mut file = fs::File::create(partial.path()).await?;
        let total = bytes.len() as u64;
        let mut sent = 0u64;
        for chunk in bytes.chunks(self.chunk_size) {
            file.write_all(chunk).await?;
            sent += chunk.len() as u64;
            progress.report_bytes(sent, total);
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(partial.path(), &target).await?;
        partial.keep();
        debug!(path = %target.display(), bytes = total, "local object written");

        Ok(format!("{LOCAL_SCHEME}{}", path.trim_start_matches('/')))
    }

    async fn delete_object(&self, location: &str) -> Result<(), BackendError> {
        let key = location
            .strip_prefix(LOCAL_SCHEME)
            .ok_or_else(|| BackendError::NotFound(location.to_string()))?;
        let target = self.resolve(key)?;

        match fs::remove_file(&target).await {
            Ok(()) => {
                info!(location = %location, "local object deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(location.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Removes an unfinished `.part` file when the write is abandoned.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
