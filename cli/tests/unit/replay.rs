//! Late subscribers replay the persisted log before live events.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use dockhand_cli::application::ports::{EventBus, OperationLogStore};
use dockhand_cli::application::services::journal::subscribe_with_replay;
use dockhand_cli::application::services::task_runner::TaskRequest;
use dockhand_cli::infra::events::BroadcastBus;
use dockhand_common::{LogEntry, OperationLog, OperationStatus, StreamKind, TaskEvent, TaskEventKind};

use crate::mocks::{Fixture, MemOps, ScriptedExecutor, host, ok};

#[tokio::test]
async fn finished_operation_replays_entries_then_end() {
    let fx = Fixture::new(
        vec![host("h1"), host("h2")],
        ScriptedExecutor::new().on("hostname", ok("node\n")),
    );
    let report = fx
        .services
        .runner
        .run(TaskRequest {
            command: "hostname".into(),
            host_ids: vec!["h1".into(), "h2".into()],
            ..TaskRequest::default()
        })
        .await
        .unwrap();

    let sub = subscribe_with_replay(&report.op_id, fx.ops.as_ref(), fx.bus.as_ref())
        .await
        .unwrap();
    assert_eq!(sub.status, OperationStatus::Completed);
    assert!(sub.live.is_none());
    let data = sub
        .replay
        .iter()
        .filter(|e| e.kind == TaskEventKind::Data && e.payload == "node")
        .count();
    assert_eq!(data, 2);
    assert_eq!(sub.replay.last().unwrap().kind, TaskEventKind::End);
}

#[tokio::test]
async fn running_operation_keeps_a_live_receiver() {
    use dockhand_common::task_channel;

    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let op_id = dockhand_cli::domain::operation::generate_operation_id();
    fx.ops.create(&op_id, "long job").await.unwrap();
    fx.ops
        .update_status(&op_id, OperationStatus::Running)
        .await
        .unwrap();

    let mut sub = subscribe_with_replay(&op_id, fx.ops.as_ref(), fx.bus.as_ref())
        .await
        .unwrap();
    assert!(sub.replay.is_empty());
    fx.bus.publish(TaskEvent {
        kind: TaskEventKind::Data,
        op_id: op_id.clone(),
        host_id: Some("h1".into()),
        payload: serde_json::json!("tick"),
    });
    let live = sub.live.as_mut().unwrap().recv().await.unwrap();
    assert_eq!(live.payload, "tick");
    assert!(task_channel(&op_id).starts_with("task:"));
}

#[tokio::test]
async fn unknown_operation_cannot_be_subscribed() {
    let fx = Fixture::new(vec![], ScriptedExecutor::new());
    assert!(
        subscribe_with_replay("op-0000000000000000", fx.ops.as_ref(), fx.bus.as_ref())
            .await
            .is_err()
    );
}

/// Store whose first read races with a journal write: the entry lands in
/// the log and on the channel after the subscriber attached.
struct RacingStore {
    inner: Arc<MemOps>,
    bus: Arc<BroadcastBus>,
    raced: AtomicBool,
}

#[async_trait]
impl OperationLogStore for RacingStore {
    async fn create(&self, op_id: &str, title: &str) -> anyhow::Result<()> {
        self.inner.create(op_id, title).await
    }

    async fn update_status(&self, op_id: &str, status: OperationStatus) -> anyhow::Result<()> {
        self.inner.update_status(op_id, status).await
    }

    async fn append_entries(&self, op_id: &str, entries: &[LogEntry]) -> anyhow::Result<()> {
        self.inner.append_entries(op_id, entries).await
    }

    async fn get(&self, op_id: &str) -> anyhow::Result<Option<OperationLog>> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let entry = LogEntry::new(StreamKind::Stdout, "pulling layer 3/5", Some("h1"));
            self.inner.append_entries(op_id, &[entry.clone()]).await?;
            self.bus.publish(TaskEvent::from_entry(op_id, &entry));
        }
        self.inner.get(op_id).await
    }

    async fn list(&self) -> anyhow::Result<Vec<OperationLog>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn entry_written_while_subscribing_is_delivered_once() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let op_id = dockhand_cli::domain::operation::generate_operation_id();
    fx.ops.create(&op_id, "pull").await.unwrap();
    fx.ops
        .update_status(&op_id, OperationStatus::Running)
        .await
        .unwrap();
    let store = RacingStore {
        inner: Arc::clone(&fx.ops),
        bus: Arc::clone(&fx.bus),
        raced: AtomicBool::new(false),
    };

    let mut sub = subscribe_with_replay(&op_id, &store, fx.bus.as_ref())
        .await
        .unwrap();
    assert_eq!(sub.replay.len(), 1);
    assert_eq!(sub.replay[0].payload, "pulling layer 3/5");

    let next = TaskEvent::from_entry(
        &op_id,
        &LogEntry::new(StreamKind::Stdout, "pulling layer 4/5", Some("h1")),
    );
    fx.bus.publish(next.clone());
    let live = sub.live.as_mut().unwrap().recv().await.unwrap();
    assert_eq!(live, next);

    // Once past the replay, a repeated line is a new line.
    let again = TaskEvent::from_entry(
        &op_id,
        &LogEntry::new(StreamKind::Stdout, "pulling layer 3/5", Some("h1")),
    );
    fx.bus.publish(again.clone());
    assert_eq!(sub.live.as_mut().unwrap().recv().await.unwrap(), again);
}
