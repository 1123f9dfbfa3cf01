//! Application service — concurrency-bounded task runner.
//!
//! Fans one command out to many hosts through a fixed pool of workers that
//! pull host ids from a shared queue. Output lines are published live on the
//! operation channel and buffered; the buffer is persisted in one batch when
//! every target has finished.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use dockhand_common::{
    Host, LogEntry, OperationStatus, StreamKind, TaskEvent, TaskEventKind,
};

use crate::application::ports::{
    EventBus, ExecOptions, HostDirectory, OperationLogStore, OutputSink, RemoteExecutor,
    SecretStore, SettingsStore,
};
use crate::application::services::credentials::resolve_credentials;
use crate::domain::operation::generate_operation_id;

/// A command handled in-process instead of being shelled out, such as
/// `@discover`.
#[async_trait]
pub trait InternalCommand: Send + Sync {
    async fn run(&self, host: &Host, sink: &dyn OutputSink) -> Result<()>;
}

/// What to run and where.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub title: Option<String>,
    pub command: String,
    pub host_ids: Vec<String>,
    /// Explicit worker count; floored at 1. `None` uses the settings value.
    pub concurrency: Option<usize>,
    pub op_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TargetOutcome {
    pub host_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub op_id: String,
    pub status: OperationStatus,
    pub outcomes: Vec<TargetOutcome>,
}

impl TaskReport {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.ok).count()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.len() - self.failed()
    }
}

/// Worker count for `targets` hosts at the requested concurrency.
#[must_use]
pub fn worker_count(concurrency: usize, targets: usize) -> usize {
    concurrency.min(targets).max(1)
}

pub struct TaskRunner {
    executor: Arc<dyn RemoteExecutor>,
    hosts: Arc<dyn HostDirectory>,
    secrets: Arc<dyn SecretStore>,
    settings: Arc<dyn SettingsStore>,
    store: Arc<dyn OperationLogStore>,
    bus: Arc<dyn EventBus>,
    internal: HashMap<String, Arc<dyn InternalCommand>>,
}

impl TaskRunner {
    #[must_use]
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        hosts: Arc<dyn HostDirectory>,
        secrets: Arc<dyn SecretStore>,
        settings: Arc<dyn SettingsStore>,
        store: Arc<dyn OperationLogStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            executor,
            hosts,
            secrets,
            settings,
            store,
            bus,
            internal: HashMap::new(),
        }
    }

    /// Register an in-process command under `name` (e.g. `@discover`).
    #[must_use]
    pub fn with_internal(mut self, name: &str, command: Arc<dyn InternalCommand>) -> Self {
        self.internal.insert(name.to_string(), command);
        self
    }

    /// Run a task to completion.
    ///
    /// Target failures never abort the task; they are recorded and make the
    /// overall status `ERROR`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the operation log cannot be created.
    #[instrument(skip_all, fields(command = %request.command, targets = request.host_ids.len()))]
    pub async fn run(self: &Arc<Self>, request: TaskRequest) -> Result<TaskReport> {
        let op_id = request.op_id.clone().unwrap_or_else(generate_operation_id);
        let title = request
            .title
            .clone()
            .unwrap_or_else(|| format!("run {}", request.command));
        self.store.create(&op_id, &title).await?;
        self.store.update_status(&op_id, OperationStatus::Running).await?;

        let settings = self.settings.load().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read settings, using defaults");
            dockhand_common::Settings::default()
        });
        let concurrency = request
            .concurrency
            .map_or_else(|| settings.effective_concurrency(), |c| c.max(1));
        let workers = worker_count(concurrency, request.host_ids.len());
        info!(%op_id, workers, "task started");

        let queue: Arc<Mutex<VecDeque<String>>> =
            Arc::new(Mutex::new(request.host_ids.iter().cloned().collect()));
        let buffer: Arc<Mutex<Vec<LogEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let options = ExecOptions::from_settings(&settings);
        let command: Arc<str> = Arc::from(request.command.as_str());

        let mut pool = tokio::task::JoinSet::new();
        for _ in 0..workers {
            let this = Arc::clone(self);
            let queue = Arc::clone(&queue);
            let buffer = Arc::clone(&buffer);
            let op_id = op_id.clone();
            let options = options.clone();
            let command = Arc::clone(&command);
            pool.spawn(async move {
                let mut outcomes = Vec::new();
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(host_id) = next else { break };
                    let sink = BufferingSink {
                        op_id: op_id.clone(),
                        host_id: host_id.clone(),
                        bus: Arc::clone(&this.bus),
                        buffer: Arc::clone(&buffer),
                    };
                    outcomes.push(this.run_target(&host_id, &command, &options, &sink).await);
                }
                outcomes
            });
        }

        let mut outcomes = Vec::with_capacity(request.host_ids.len());
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(batch) => outcomes.extend(batch),
                Err(e) => warn!(%op_id, error = %e, "task worker panicked"),
            }
        }
        // Targets a panicked worker never reported are failures too.
        for host_id in &request.host_ids {
            if !outcomes.iter().any(|o: &TargetOutcome| &o.host_id == host_id) {
                outcomes.push(TargetOutcome {
                    host_id: host_id.clone(),
                    ok: false,
                    exit_code: None,
                    error: Some("worker aborted".to_string()),
                });
            }
        }
        outcomes.sort_by(|a, b| a.host_id.cmp(&b.host_id));

        let entries = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
        if let Err(e) = self.store.append_entries(&op_id, &entries).await {
            warn!(%op_id, error = %e, "cannot persist task output");
        }
        let status = if outcomes.iter().all(|o| o.ok) {
            OperationStatus::Completed
        } else {
            OperationStatus::Error
        };
        if let Err(e) = self.store.update_status(&op_id, status).await {
            warn!(%op_id, error = %e, "cannot close operation log");
        }
        let report = TaskReport {
            op_id: op_id.clone(),
            status,
            outcomes,
        };
        self.bus.publish(TaskEvent {
            kind: TaskEventKind::End,
            op_id: op_id.clone(),
            host_id: None,
            payload: serde_json::json!({
                "status": status,
                "succeeded": report.succeeded(),
                "failed": report.failed(),
            }),
        });
        info!(%op_id, %status, failed = report.failed(), "task finished");
        Ok(report)
    }

    async fn run_target(
        &self,
        host_id: &str,
        command: &str,
        options: &ExecOptions,
        sink: &BufferingSink,
    ) -> TargetOutcome {
        let failed = |error: String| {
            sink.error(&error);
            TargetOutcome {
                host_id: host_id.to_string(),
                ok: false,
                exit_code: None,
                error: Some(error),
            }
        };
        let host = match self.hosts.get(host_id) {
            Ok(h) => h,
            Err(e) => return failed(format!("{e:#}")),
        };

        if let Some(internal) = self.internal.get(command) {
            debug!(host_id, command, "running internal command");
            return match internal.run(&host, sink).await {
                Ok(()) => TargetOutcome {
                    host_id: host_id.to_string(),
                    ok: true,
                    exit_code: Some(0),
                    error: None,
                },
                Err(e) => failed(format!("{e:#}")),
            };
        }

        let credentials = match resolve_credentials(&host, self.secrets.as_ref()) {
            Ok(c) => c,
            Err(e) => return failed(format!("{e:#}")),
        };
        let out = self
            .executor
            .execute_streaming(&host, &credentials, command, options, sink)
            .await;
        if let Some(error) = &out.error {
            return TargetOutcome {
                exit_code: Some(out.exit_code),
                ..failed(error.clone())
            };
        }
        sink.line(StreamKind::System, &format!("exit code {}", out.exit_code));
        TargetOutcome {
            host_id: host_id.to_string(),
            ok: out.exit_code == 0,
            exit_code: Some(out.exit_code),
            error: None,
        }
    }
}

/// Publishes each line tagged `(op_id, host_id)` and keeps a copy for the
/// final batch write.
struct BufferingSink {
    op_id: String,
    host_id: String,
    bus: Arc<dyn EventBus>,
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl BufferingSink {
    fn error(&self, message: &str) {
        let entry = LogEntry::new(StreamKind::Stderr, message, Some(&self.host_id));
        self.bus.publish(TaskEvent {
            kind: TaskEventKind::Error,
            op_id: self.op_id.clone(),
            host_id: Some(self.host_id.clone()),
            payload: serde_json::Value::String(message.to_string()),
        });
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl OutputSink for BufferingSink {
    fn line(&self, stream: StreamKind, line: &str) {
        let entry = LogEntry::new(stream, line, Some(&self.host_id));
        self.bus.publish(TaskEvent::from_entry(&self.op_id, &entry));
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
