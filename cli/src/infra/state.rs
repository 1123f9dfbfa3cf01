//! JSON-file implementations of the `ContainerRepository` and
//! `OperationLogStore` ports.
//!
//! Each store keeps one document on disk. Loads and saves run on the
//! blocking pool, writes are atomic (temp file + rename, `0600`) and an
//! in-process async lock serializes read-modify-write cycles.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;

use dockhand_common::{
    ContainerRecord, LogEntry, OperationLog, OperationStatus, validate_operation_id,
};

use crate::application::ports::{ContainerRepository, OperationLogStore};
use crate::infra::paths::data_dir;

/// Oldest operation logs beyond this count are dropped on create.
pub const MAX_OPERATIONS: usize = 500;

// ── JSON document file ────────────────────────────────────────────────────────

struct JsonFile<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            _doc: PhantomData,
        }
    }

    /// Synchronous load — used internally by `load` via `spawn_blocking`.
    fn load_sync(path: &PathBuf) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Synchronous save — used internally by `save` via `spawn_blocking`.
    fn save_sync(path: &PathBuf, doc: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(doc).context("serializing document")?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("finalizing {}", path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<T> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .context("load task panicked")?
    }

    async fn save(&self, doc: T) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &doc))
            .await
            .context("save task panicked")?
    }
}

// ── Container registry ────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContainerDoc {
    #[serde(default)]
    next_row_id: u64,
    #[serde(default)]
    containers: Vec<ContainerRecord>,
}

/// Container registry in `containers.json`.
pub struct JsonContainerStore {
    file: JsonFile<ContainerDoc>,
    lock: Mutex<()>,
}

impl JsonContainerStore {
    /// Store at `$DOCKHAND_HOME/containers.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(data_dir()?.join("containers.json")))
    }

    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            file: JsonFile::new(path),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ContainerRepository for JsonContainerStore {
    async fn list_by_host(&self, host_id: &str) -> Result<Vec<ContainerRecord>> {
        let _guard = self.lock.lock().await;
        let doc = self.file.load().await?;
        Ok(doc
            .containers
            .into_iter()
            .filter(|c| c.host_id == host_id)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ContainerRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.file.load().await?.containers)
    }

    async fn insert(&self, mut record: ContainerRecord) -> Result<ContainerRecord> {
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        let max_existing = doc.containers.iter().map(|c| c.row_id).max().unwrap_or(0);
        doc.next_row_id = doc.next_row_id.max(max_existing) + 1;
        record.row_id = doc.next_row_id;
        doc.containers.push(record.clone());
        self.file.save(doc).await?;
        Ok(record)
    }

    async fn update(&self, record: &ContainerRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        let slot = doc
            .containers
            .iter_mut()
            .find(|c| c.row_id == record.row_id)
            .with_context(|| format!("container row {} no longer exists", record.row_id))?;
        *slot = record.clone();
        self.file.save(doc).await
    }

    async fn delete(&self, row_ids: &[u64]) -> Result<usize> {
        if row_ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        let before = doc.containers.len();
        doc.containers.retain(|c| !row_ids.contains(&c.row_id));
        let removed = before - doc.containers.len();
        if removed > 0 {
            self.file.save(doc).await?;
        }
        Ok(removed)
    }

    async fn purge(&self, host_id: Option<&str>) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        let before = doc.containers.len();
        match host_id {
            Some(h) => doc.containers.retain(|c| c.host_id != h),
            None => doc.containers.clear(),
        }
        let removed = before - doc.containers.len();
        self.file.save(doc).await?;
        Ok(removed)
    }
}

// ── Operation logs ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct OperationDoc {
    #[serde(default)]
    operations: Vec<OperationLog>,
}

/// Operation log store in `operations.json`.
pub struct JsonOperationStore {
    file: JsonFile<OperationDoc>,
    lock: Mutex<()>,
}

impl JsonOperationStore {
    /// Store at `$DOCKHAND_HOME/operations.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(data_dir()?.join("operations.json")))
    }

    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            file: JsonFile::new(path),
            lock: Mutex::new(()),
        }
    }
}

fn find<'a>(doc: &'a mut OperationDoc, op_id: &str) -> Result<&'a mut OperationLog> {
    doc.operations
        .iter_mut()
        .find(|o| o.id == op_id)
        .with_context(|| format!("operation {op_id} not found"))
}

#[async_trait]
impl OperationLogStore for JsonOperationStore {
    async fn create(&self, op_id: &str, title: &str) -> Result<()> {
        validate_operation_id(op_id)?;
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        if doc.operations.iter().any(|o| o.id == op_id) {
            anyhow::bail!("operation {op_id} already exists");
        }
        doc.operations.push(OperationLog {
            id: op_id.to_string(),
            title: title.to_string(),
            status: OperationStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            entries: Vec::new(),
        });
        if doc.operations.len() > MAX_OPERATIONS {
            doc.operations.sort_by_key(|o| o.started_at);
            let excess = doc.operations.len() - MAX_OPERATIONS;
            doc.operations.drain(..excess);
        }
        self.file.save(doc).await
    }

    async fn update_status(&self, op_id: &str, status: OperationStatus) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        let op = find(&mut doc, op_id)?;
        op.status = status;
        if status.is_terminal() {
            op.ended_at = Some(Utc::now());
        }
        self.file.save(doc).await
    }

    async fn append_entries(&self, op_id: &str, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut doc = self.file.load().await?;
        find(&mut doc, op_id)?.entries.extend_from_slice(entries);
        self.file.save(doc).await
    }

    async fn get(&self, op_id: &str) -> Result<Option<OperationLog>> {
        let _guard = self.lock.lock().await;
        let doc = self.file.load().await?;
        Ok(doc.operations.into_iter().find(|o| o.id == op_id))
    }

    async fn list(&self) -> Result<Vec<OperationLog>> {
        let _guard = self.lock.lock().await;
        let mut ops = self.file.load().await?.operations;
        ops.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(ops)
    }
}
