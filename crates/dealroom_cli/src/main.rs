use std::{
    collections::BTreeSet,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use dealroom_contract::{Destination, QueueRow, SourceFile, TransferStatus};
use dealroom_control_plane::{build_router, spawn_session_reaper, AppState};
use dealroom_queue::{QueueConfig, QueueManager};
use dealroom_storage::{SqliteMetadataStore, StorageConfig};
use dealroom_transfer::{InMemoryStorageBackend, LocalStorageBackend, StorageBackend};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Dealroom document upload daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        #[arg(long, default_value = "config/dealroom.toml")]
        config: PathBuf,
    },
    /// Upload local files into a collection and report each row change.
    Upload {
        #[arg(long, default_value = "config/dealroom.toml")]
        config: PathBuf,
        #[arg(long)]
        collection: String,
        #[arg(long, default_value = "")]
        folder: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value = "local-operator")]
        actor: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    http: HttpSection,
    storage: StorageSection,
    #[serde(default)]
    objects: ObjectsSection,
    #[serde(default)]
    queue: QueueSection,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpSection {
    bind: String,
    auth_token: Option<String>,
    #[serde(default = "default_session_idle_secs")]
    session_idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    sqlite_path: String,
    #[serde(default = "default_max_connections")]
    max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ObjectBackendKind {
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectsSection {
    backend: ObjectBackendKind,
    #[serde(default = "default_object_root")]
    root: PathBuf,
}

impl Default for ObjectsSection {
    fn default() -> Self {
        Self {
            backend: ObjectBackendKind::Local,
            root: default_object_root(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct QueueSection {
    max_concurrent: Option<usize>,
    transfer_timeout_secs: Option<u64>,
}

impl QueueSection {
    fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_concurrent: self.max_concurrent,
            transfer_timeout: self
                .transfer_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

fn default_max_connections() -> u32 {
    5
}

fn default_object_root() -> PathBuf {
    PathBuf::from("data/objects")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Upload {
            config,
            collection,
            folder,
            tags,
            actor,
            files,
        } => {
            let destination = Destination {
                collection_id: collection,
                folder,
                tags: tags.into_iter().collect::<BTreeSet<_>>(),
                actor_id: actor,
            };
            upload(config, destination, files).await
        }
    }
}

fn load_config(config_path: &Path) -> Result<RuntimeConfig> {
    let config_source = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))
}

async fn open_store(section: &StorageSection) -> Result<Arc<SqliteMetadataStore>> {
    let on_disk = !section.sqlite_path.starts_with("sqlite:");
    if on_disk {
        if let Some(parent) = PathBuf::from(&section.sqlite_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
    }

    let store = SqliteMetadataStore::connect(&StorageConfig {
        sqlite_path: section.sqlite_path.clone(),
        max_connections: section.max_connections,
    })
    .await?;
    Ok(Arc::new(store))
}

async fn open_backend(section: &ObjectsSection) -> Result<Arc<dyn StorageBackend>> {
    match section.backend {
        ObjectBackendKind::Local => {
            let backend = LocalStorageBackend::new(section.root.clone())
                .await
                .with_context(|| {
                    format!("failed to open object root {}", section.root.display())
                })?;
            info!(root = %section.root.display(), "local object storage ready");
            Ok(Arc::new(backend))
        }
        ObjectBackendKind::Memory => {
            warn!("memory object storage selected: uploads are lost on exit");
            Ok(Arc::new(InMemoryStorageBackend::new()))
        }
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;

    let require_bearer = requires_token(&config.http.bind);
    if require_bearer && config.http.auth_token.is_none() {
        return Err(anyhow!(
            "non-loopback bind {} requires http.auth_token",
            config.http.bind
        ));
    }

    if !require_bearer {
        info!("loopback bind detected: bearer auth optional");
    } else {
        warn!("non-loopback bind detected: bearer auth enforced");
    }

    let store = open_store(&config.storage).await?;
    let backend = open_backend(&config.objects).await?;
    let state = AppState::new(
        store,
        backend,
        config.queue.queue_config(),
        config.http.auth_token.clone(),
        require_bearer,
    );
    if config.http.session_idle_secs > 0 {
        spawn_session_reaper(
            state.clone(),
            Duration::from_secs(config.http.session_idle_secs),
        );
    }
    let app = build_router(state);

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "dealroomd control-plane listening");
    axum::serve(listener, app).await.context("axum server failed")
}

async fn upload(config_path: PathBuf, destination: Destination, paths: Vec<PathBuf>) -> Result<()> {
    let config = load_config(&config_path)?;
    let store = open_store(&config.storage).await?;
    let backend = open_backend(&config.objects).await?;

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.push(source_file(path, bytes)?);
    }

    let queue = QueueManager::new(backend, store, config.queue.queue_config());
    let mut notices = queue.notices();
    let item_ids = queue.submit(files, destination)?;
    info!(items = item_ids.len(), "upload started");

    let settled = queue.settled();
    tokio::pin!(settled);
    let mut interrupted = false;

    let rows = loop {
        tokio::select! {
            biased;
            notice = notices.recv() => match notice {
                Ok(row) => print_row(&row),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "row updates skipped"),
                Err(RecvError::Closed) => break queue.rows(),
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                let report = queue.close_all().await;
                warn!(cancelled = report.cancelled, "interrupted: remaining uploads cancelled");
            }
            rows = &mut settled => break rows,
        }
    };
    while let Ok(row) = notices.try_recv() {
        print_row(&row);
    }
    queue.close_all().await;

    let failed = rows.iter().filter(|row| row.status == TransferStatus::Failed).count();
    if failed > 0 {
        bail!("{failed} of {} uploads failed", rows.len());
    }
    Ok(())
}

fn source_file(path: &Path, bytes: Vec<u8>) -> Result<SourceFile> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
    let content_type = mime_guess::from_path(&name)
        .first_or_octet_stream()
        .to_string();
    Ok(SourceFile::new(name, Some(content_type), bytes))
}

fn print_row(row: &QueueRow) {
    match &row.error_message {
        Some(error) => println!(
            "{}\t{}\t{}\t{}%\t{}",
            row.name, row.size_label, row.status, row.progress_percent, error
        ),
        None => println!(
            "{}\t{}\t{}\t{}%",
            row.name, row.size_label, row.status, row.progress_percent
        ),
    }
}

fn requires_token(bind: &str) -> bool {
    match bind.parse::<SocketAddr>() {
        Ok(addr) => !addr.ip().is_loopback(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{requires_token, source_file, ObjectBackendKind, RuntimeConfig};
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn parses_full_config() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [http]
            bind = "0.0.0.0:8080"
            auth_token = "s3cret"

            [storage]
            sqlite_path = "data/dealroom.sqlite"

            [objects]
            backend = "memory"

            [queue]
            max_concurrent = 4
            transfer_timeout_secs = 120
            "#,
        )
        .expect("config");

        assert_eq!(config.storage.max_connections, 5);
        assert_eq!(config.http.session_idle_secs, 1800);
        assert_eq!(config.objects.backend, ObjectBackendKind::Memory);
        let queue = config.queue.queue_config();
        assert_eq!(queue.concurrency_limit(), Some(4));
        assert_eq!(queue.transfer_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn optional_sections_default_to_unbounded_local_storage() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [http]
            bind = "127.0.0.1:8080"

            [storage]
            sqlite_path = "sqlite::memory:"
            "#,
        )
        .expect("config");

        assert_eq!(config.objects.backend, ObjectBackendKind::Local);
        assert_eq!(config.queue.queue_config().concurrency_limit(), None);
        assert_eq!(config.queue.queue_config().transfer_timeout, None);
    }

    #[test]
    fn only_loopback_binds_skip_auth() {
        assert!(!requires_token("127.0.0.1:8080"));
        assert!(!requires_token("[::1]:8080"));
        assert!(requires_token("0.0.0.0:8080"));
        assert!(requires_token("not-an-address"));
    }

    #[test]
    fn uploaded_files_carry_a_guessed_content_type() {
        let pdf = source_file(Path::new("/tmp/deals/Sale Deed.pdf"), vec![1, 2, 3]).expect("pdf");
        let photo = source_file(Path::new("front.JPG"), Vec::new()).expect("photo");
        let unknown = source_file(Path::new("notes.zzunknown"), Vec::new()).expect("unknown");

        assert_eq!(pdf.name, "Sale Deed.pdf");
        assert_eq!(pdf.media_type(), "application/pdf");
        assert_eq!(photo.media_type(), "image/jpeg");
        assert_eq!(unknown.media_type(), "application/octet-stream");
        assert!(source_file(Path::new("/"), Vec::new()).is_err());
    }
}
