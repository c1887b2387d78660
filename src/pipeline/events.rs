//! Node-completion events
//!
//! Streamed to observers (the CLI progress renderer) as the state machine
//! advances. Delivery is best effort; a run never waits on a slow observer.

use serde::Serialize;
use tokio::sync::broadcast;

use super::graph::Node;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    NodeCompleted {
        node: Node,
        step: usize,
        elapsed_ms: u64,
        /// One-line description of what the node produced
        detail: String,
    },
    Suspended {
        question: String,
    },
    Finished {
        success: bool,
        total_ms: u64,
    },
}

/// Broadcast handle for pipeline events
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event; discarded when nobody is subscribed
    #[inline]
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(64)
    }
}
