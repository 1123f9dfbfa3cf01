//! In-process implementation of the `EventBus` port.
//!
//! One tokio broadcast channel per `task:<opId>` channel name. Channels are
//! created on first publish or subscribe and dropped once an `end` event has
//! gone out.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use dockhand_common::{TaskEvent, TaskEventKind, task_channel};

use crate::application::ports::EventBus;

/// Buffered events per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
pub struct BroadcastBus {
    channels: Mutex<HashMap<String, broadcast::Sender<TaskEvent>>>,
}

impl BroadcastBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: TaskEvent) {
        let channel = task_channel(&event.op_id);
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let end = event.kind == TaskEventKind::End;
        if let Some(tx) = channels.get(&channel) {
            // No subscribers is not an error.
            let _ = tx.send(event);
        } else {
            trace!(%channel, "no subscribers");
        }
        if end {
            channels.remove(&channel);
        }
    }

    fn subscribe(&self, op_id: &str) -> broadcast::Receiver<TaskEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(task_channel(op_id))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
