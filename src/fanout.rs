//! Best-effort mutation notification fanout
//!
//! After each successful create/update/delete the orchestrator emits exactly
//! one "topic changed" event to a process-wide broadcast channel. Delivery
//! is fire-and-forget: the channel is created at startup and injected, and a
//! failed send is logged and dropped — it can never fail or delay the
//! mutation that triggered it.

use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Mutation category whose feed changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Pictures,
    Comments,
    Profiles,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pictures => "pictures",
            Self::Comments => "comments",
            Self::Profiles => "profiles",
        }
    }
}

#[derive(Clone)]
pub struct Fanout {
    tx: broadcast::Sender<Topic>,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit a topic-changed event. Never blocks, never fails the caller.
    pub fn notify(&self, topic: Topic) {
        match self.tx.send(topic) {
            Ok(receivers) => trace!(topic = topic.as_str(), receivers, "notification sent"),
            Err(_) => debug!(topic = topic.as_str(), "no subscribers, notification dropped"),
        }
    }

    /// Subscribe to the change feed (live-feed UIs and the like).
    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.tx.subscribe()
    }
}
