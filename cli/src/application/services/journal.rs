//! Application service — per-operation journal.
//!
//! Every line a service wants an operator to see goes through a journal. It
//! is always mirrored to `tracing`; when attached to an operation it is also
//! appended to the operation log store immediately and published on the
//! operation's event channel.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};

use dockhand_common::{
    LogEntry, OperationStatus, StreamKind, TaskEvent, TaskEventKind,
};

use crate::application::ports::{EventBus, OperationLogStore};
use crate::domain::operation::generate_operation_id;

/// A late subscription: persisted history first, then live events.
pub struct Subscription {
    pub status: OperationStatus,
    pub replay: Vec<TaskEvent>,
    /// `None` once the operation has finished.
    pub live: Option<LiveEvents>,
}

/// Live side of a [`Subscription`].
///
/// Events published between attaching the receiver and reading the history
/// show up in both. Until the first event that is not part of the replay,
/// live events equal to a replayed one are consumed silently.
pub struct LiveEvents {
    rx: broadcast::Receiver<TaskEvent>,
    replayed: VecDeque<TaskEvent>,
}

impl LiveEvents {
    #[must_use]
    pub fn new(rx: broadcast::Receiver<TaskEvent>) -> Self {
        Self {
            rx,
            replayed: VecDeque::new(),
        }
    }

    fn after_replay(rx: broadcast::Receiver<TaskEvent>, replay: &[TaskEvent]) -> Self {
        Self {
            rx,
            replayed: replay.iter().cloned().collect(),
        }
    }

    /// Next event not already delivered by the replay.
    ///
    /// # Errors
    ///
    /// Returns the channel error when the sender is gone or this receiver
    /// fell behind.
    pub async fn recv(&mut self) -> Result<TaskEvent, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.replayed.is_empty() {
                return Ok(event);
            }
            match self.replayed.iter().position(|seen| *seen == event) {
                Some(pos) => {
                    self.replayed.remove(pos);
                }
                None => {
                    self.replayed.clear();
                    return Ok(event);
                }
            }
        }
    }
}

/// Subscribe to an operation's channel, replaying what is already stored.
///
/// The live receiver is attached before the history is read so that nothing
/// published in between is lost; duplicates are filtered by [`LiveEvents`].
///
/// # Errors
///
/// Returns an error if the operation does not exist or cannot be read.
pub async fn subscribe_with_replay(
    op_id: &str,
    store: &dyn OperationLogStore,
    bus: &dyn EventBus,
) -> Result<Subscription> {
    let live = bus.subscribe(op_id);
    let log = store
        .get(op_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("operation {op_id} not found"))?;
    let mut replay: Vec<TaskEvent> = log
        .entries
        .iter()
        .map(|e| TaskEvent::from_entry(op_id, e))
        .collect();
    if log.status.is_terminal() {
        replay.push(TaskEvent {
            kind: TaskEventKind::End,
            op_id: op_id.to_string(),
            host_id: None,
            payload: serde_json::json!({ "status": log.status }),
        });
        return Ok(Subscription {
            status: log.status,
            replay,
            live: None,
        });
    }
    let live = LiveEvents::after_replay(live, &replay);
    Ok(Subscription {
        status: log.status,
        replay,
        live: Some(live),
    })
}

struct Sinks {
    op_id: String,
    store: Arc<dyn OperationLogStore>,
    bus: Arc<dyn EventBus>,
}

pub struct OperationJournal {
    sinks: Option<Sinks>,
}

impl OperationJournal {
    /// A journal that only writes to `tracing`.
    #[must_use]
    pub fn detached() -> Self {
        Self { sinks: None }
    }

    /// Create (or adopt) an operation log and mark it running.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation log cannot be created.
    pub async fn begin(
        title: &str,
        op_id: Option<String>,
        store: Arc<dyn OperationLogStore>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self> {
        let op_id = op_id.unwrap_or_else(generate_operation_id);
        store.create(&op_id, title).await?;
        store.update_status(&op_id, OperationStatus::Running).await?;
        info!(%op_id, title, "operation started");
        Ok(Self {
            sinks: Some(Sinks { op_id, store, bus }),
        })
    }

    #[must_use]
    pub fn op_id(&self) -> Option<&str> {
        self.sinks.as_ref().map(|s| s.op_id.as_str())
    }

    pub async fn info(&self, host_id: Option<&str>, message: &str) {
        info!(op_id = self.op_id(), host_id, "{message}");
        self.record(LogEntry::new(StreamKind::System, message, host_id))
            .await;
    }

    pub async fn error(&self, host_id: Option<&str>, message: &str) {
        warn!(op_id = self.op_id(), host_id, "{message}");
        self.record(LogEntry::new(StreamKind::Stderr, message, host_id))
            .await;
    }

    async fn record(&self, entry: LogEntry) {
        let Some(sinks) = &self.sinks else {
            return;
        };
        if let Err(e) = sinks
            .store
            .append_entries(&sinks.op_id, std::slice::from_ref(&entry))
            .await
        {
            warn!(op_id = %sinks.op_id, error = %e, "cannot append operation log entry");
        }
        sinks.bus.publish(TaskEvent::from_entry(&sinks.op_id, &entry));
    }

    /// Close the operation with a terminal status and publish `end`.
    pub async fn finish(&self, ok: bool) {
        let Some(sinks) = &self.sinks else {
            return;
        };
        let status = if ok {
            OperationStatus::Completed
        } else {
            OperationStatus::Error
        };
        if let Err(e) = sinks.store.update_status(&sinks.op_id, status).await {
            warn!(op_id = %sinks.op_id, error = %e, "cannot close operation log");
        }
        sinks.bus.publish(TaskEvent {
            kind: TaskEventKind::End,
            op_id: sinks.op_id.clone(),
            host_id: None,
            payload: serde_json::json!({ "status": status }),
        });
        info!(op_id = %sinks.op_id, %status, "operation finished");
    }
}
