//! Shared mock infrastructure for unit tests.
//!
//! A scripted executor stands in for SSH, in-memory stores stand in for the
//! files under the data directory, and the secret store is a `mockall` mock.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;

use dockhand_cli::app::{Ports, Services};
use dockhand_cli::application::ports::{
    ContainerRepository, Credentials, ExecOptions, ExecOutput, HostDirectory, OperationLogStore,
    OutputSink, RemoteExecutor, SecretStore, SettingsStore,
};
use dockhand_cli::domain::error::HostError;
use dockhand_cli::infra::events::BroadcastBus;
use dockhand_common::{
    ContainerRecord, Host, HostAuth, HostRole, LogEntry, OperationLog, OperationStatus, Settings,
    StreamKind,
};

// ── Output helpers ────────────────────────────────────────────────────────────

pub fn ok(stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        ..ExecOutput::default()
    }
}

pub fn fail(stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 1,
        stderr: stderr.to_string(),
        ..ExecOutput::default()
    }
}

pub fn host(id: &str) -> Host {
    Host {
        id: id.to_string(),
        address: format!("{id}.example.net"),
        user: "root".to_string(),
        port: 22,
        role: HostRole::Remote,
        tags: Vec::new(),
        auth: HostAuth::default(),
    }
}

// ── Scripted executor ─────────────────────────────────────────────────────────

struct Rule {
    host: Option<String>,
    pattern: String,
    /// The last reply repeats once the others are used up.
    replies: VecDeque<ExecOutput>,
}

/// Answers commands by substring match, first rule wins. Unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long (use with a paused clock).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on(self, pattern: &str, reply: ExecOutput) -> Self {
        self.push(None, pattern, vec![reply]);
        self
    }

    pub fn on_host(self, host_id: &str, pattern: &str, reply: ExecOutput) -> Self {
        self.push(Some(host_id), pattern, vec![reply]);
        self
    }

    pub fn on_seq(self, pattern: &str, replies: Vec<ExecOutput>) -> Self {
        self.push(None, pattern, replies);
        self
    }

    fn push(&self, host: Option<&str>, pattern: &str, replies: Vec<ExecOutput>) {
        self.rules.lock().unwrap().push(Rule {
            host: host.map(str::to_string),
            pattern: pattern.to_string(),
            replies: replies.into(),
        });
    }

    /// Commands in call order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply(&self, host_id: &str, command: &str) -> ExecOutput {
        self.calls
            .lock()
            .unwrap()
            .push((host_id.to_string(), command.to_string()));
        let mut rules = self.rules.lock().unwrap();
        let rule = rules.iter_mut().find(|r| {
            command.contains(&r.pattern) && r.host.as_deref().is_none_or(|h| h == host_id)
        });
        match rule {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front().unwrap(),
            Some(rule) => rule.replies.front().cloned().unwrap_or_default(),
            None => ExecOutput::default(),
        }
    }

    async fn call(&self, host: &Host, command: &str) -> ExecOutput {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.reply(&host.id, command)
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        host: &Host,
        _credentials: &Credentials,
        command: &str,
        _options: &ExecOptions,
    ) -> ExecOutput {
        self.call(host, command).await
    }

    async fn execute_streaming(
        &self,
        host: &Host,
        _credentials: &Credentials,
        command: &str,
        _options: &ExecOptions,
        sink: &dyn OutputSink,
    ) -> ExecOutput {
        let out = self.call(host, command).await;
        for line in out.stdout.lines() {
            sink.line(StreamKind::Stdout, line);
        }
        for line in out.stderr.lines() {
            sink.line(StreamKind::Stderr, line);
        }
        out
    }
}

// ── Secret store ──────────────────────────────────────────────────────────────

mock! {
    pub Secrets {}

    impl SecretStore for Secrets {
        fn decrypt(&self, value: &str) -> Option<String>;
        fn encrypt(&self, plaintext: &str) -> anyhow::Result<String>;
    }
}

/// Secrets that decrypt to themselves.
pub fn passthrough_secrets() -> MockSecrets {
    let mut secrets = MockSecrets::new();
    secrets.expect_decrypt().returning(|v| Some(v.to_string()));
    secrets
        .expect_encrypt()
        .returning(|v| Ok(format!("v1:{v}")));
    secrets
}

// ── In-memory stores ──────────────────────────────────────────────────────────

pub struct MemHosts(pub Vec<Host>);

impl HostDirectory for MemHosts {
    fn list(&self) -> Result<Vec<Host>> {
        Ok(self.0.clone())
    }

    fn get(&self, id: &str) -> Result<Host> {
        self.0
            .iter()
            .find(|h| h.id == id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(id.to_string()).into())
    }
}

#[derive(Default)]
pub struct MemSettings(pub Mutex<Settings>);

impl SettingsStore for MemSettings {
    fn load(&self) -> Result<Settings> {
        Ok(self.0.lock().unwrap().clone())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        *self.0.lock().unwrap() = settings.clone();
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/nonexistent/settings.yaml"))
    }
}

#[derive(Default)]
pub struct MemRepo {
    rows: Mutex<Vec<ContainerRecord>>,
    next: AtomicU64,
}

impl MemRepo {
    /// Insert directly, bypassing the port.
    pub fn seed(&self, mut record: ContainerRecord) -> ContainerRecord {
        record.row_id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.lock().unwrap().push(record.clone());
        record
    }

    pub fn rows(&self) -> Vec<ContainerRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRepository for MemRepo {
    async fn list_by_host(&self, host_id: &str) -> Result<Vec<ContainerRecord>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|r| r.host_id == host_id)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ContainerRecord>> {
        Ok(self.rows())
    }

    async fn insert(&self, record: ContainerRecord) -> Result<ContainerRecord> {
        Ok(self.seed(record))
    }

    async fn update(&self, record: &ContainerRecord) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.row_id == record.row_id)
            .ok_or_else(|| anyhow::anyhow!("row {} missing", record.row_id))?;
        *row = record.clone();
        Ok(())
    }

    async fn delete(&self, row_ids: &[u64]) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !row_ids.contains(&r.row_id));
        Ok(before - rows.len())
    }

    async fn purge(&self, host_id: Option<&str>) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| host_id.is_some_and(|h| r.host_id != h));
        Ok(before - rows.len())
    }
}

#[derive(Default)]
pub struct MemOps(Mutex<HashMap<String, OperationLog>>);

#[async_trait]
impl OperationLogStore for MemOps {
    async fn create(&self, op_id: &str, title: &str) -> Result<()> {
        let mut logs = self.0.lock().unwrap();
        anyhow::ensure!(!logs.contains_key(op_id), "operation {op_id} exists");
        logs.insert(
            op_id.to_string(),
            OperationLog {
                id: op_id.to_string(),
                title: title.to_string(),
                status: OperationStatus::Pending,
                started_at: Utc::now(),
                ended_at: None,
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    async fn update_status(&self, op_id: &str, status: OperationStatus) -> Result<()> {
        let mut logs = self.0.lock().unwrap();
        let log = logs
            .get_mut(op_id)
            .ok_or_else(|| anyhow::anyhow!("no operation {op_id}"))?;
        log.status = status;
        if status.is_terminal() {
            log.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn append_entries(&self, op_id: &str, entries: &[LogEntry]) -> Result<()> {
        let mut logs = self.0.lock().unwrap();
        let log = logs
            .get_mut(op_id)
            .ok_or_else(|| anyhow::anyhow!("no operation {op_id}"))?;
        log.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn get(&self, op_id: &str) -> Result<Option<OperationLog>> {
        Ok(self.0.lock().unwrap().get(op_id).cloned())
    }

    async fn list(&self) -> Result<Vec<OperationLog>> {
        let mut logs: Vec<OperationLog> = self.0.lock().unwrap().values().cloned().collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(logs)
    }
}

// ── Fixture ───────────────────────────────────────────────────────────────────

/// Wired services over mocks, with typed handles to inspect them.
pub struct Fixture {
    pub exec: Arc<ScriptedExecutor>,
    pub repo: Arc<MemRepo>,
    pub ops: Arc<MemOps>,
    pub bus: Arc<BroadcastBus>,
    pub settings: Arc<MemSettings>,
    pub services: Services,
}

impl Fixture {
    pub fn new(hosts: Vec<Host>, exec: ScriptedExecutor) -> Self {
        let exec = Arc::new(exec);
        let repo = Arc::new(MemRepo::default());
        let ops = Arc::new(MemOps::default());
        let bus = Arc::new(BroadcastBus::new());
        let settings = Arc::new(MemSettings::default());
        let ports = Ports {
            executor: exec.clone(),
            hosts: Arc::new(MemHosts(hosts)),
            secrets: Arc::new(passthrough_secrets()),
            settings: settings.clone(),
            containers: repo.clone(),
            operations: ops.clone(),
            bus: bus.clone(),
        };
        Self {
            exec,
            repo,
            ops,
            bus,
            settings,
            services: Services::wire(ports),
        }
    }
}
