//! Event bus for run lifecycle events.
//!
//! Uses [`tokio::sync::broadcast`] for fan-out delivery to multiple
//! subscribers. Events are fire-and-forget projections -- dropping them is
//! acceptable.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use weft_core::{NodeRef, RunId, TokenId, TokenPath, WorkflowId};

use crate::trace::TraceEvent;

/// Run lifecycle event.
///
/// Emitted by the coordinator as a run progresses. Sub-workflow runs emit
/// onto the same bus as their parent, distinguished by `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run has started.
    WorkflowStarted {
        /// The run identifier.
        run_id: RunId,
        /// The workflow being run.
        workflow_id: WorkflowId,
    },
    /// A token was created.
    TokenSpawned {
        /// The run identifier.
        run_id: RunId,
        /// The new token.
        token: TokenId,
        /// The node it will execute.
        node: NodeRef,
        /// Its lineage path.
        path: TokenPath,
    },
    /// A token was handed to the action executor.
    NodeStarted {
        /// The run identifier.
        run_id: RunId,
        /// The dispatched token.
        token: TokenId,
        /// The node being executed.
        node: NodeRef,
    },
    /// A token's action completed successfully.
    NodeCompleted {
        /// The run identifier.
        run_id: RunId,
        /// The completed token.
        token: TokenId,
        /// The node that completed.
        node: NodeRef,
    },
    /// A fan-in point activated; exactly one continuation follows.
    FanInActivated {
        /// The run identifier.
        run_id: RunId,
        /// The fan-in identifier, as `group:target`.
        fan_in_path: String,
        /// Tokens whose outputs were joined.
        merged: Vec<TokenId>,
    },
    /// Branch outputs were combined into the shared context.
    BranchesMerged {
        /// The run identifier.
        run_id: RunId,
        /// The merge target path.
        target: String,
        /// How many branches contributed.
        contributors: usize,
    },
    /// The run completed successfully.
    WorkflowCompleted {
        /// The run identifier.
        run_id: RunId,
    },
    /// The run failed.
    WorkflowFailed {
        /// The run identifier.
        run_id: RunId,
        /// Failure description.
        reason: String,
    },
    /// A fine-grained planner trace event.
    Trace {
        /// The run identifier.
        run_id: RunId,
        /// The trace payload.
        trace: TraceEvent,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::WorkflowStarted { run_id, .. }
            | Self::TokenSpawned { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::FanInActivated { run_id, .. }
            | Self::BranchesMerged { run_id, .. }
            | Self::WorkflowCompleted { run_id }
            | Self::WorkflowFailed { run_id, .. }
            | Self::Trace { run_id, .. } => *run_id,
        }
    }

    /// Returns `true` for planner trace events.
    #[must_use]
    pub fn is_trace(&self) -> bool {
        matches!(self, Self::Trace { .. })
    }
}

/// Broadcast-based event bus.
///
/// Delivers events to all active subscribers. If no subscribers are
/// listening, events are silently dropped (fire-and-forget).
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    ///
    /// When the channel is full, the oldest events are dropped (lagging
    /// subscribers see the gap, not an error).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns silently if there are no active subscribers.
    pub fn emit(&self, event: RunEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // Ignore send error (no active receivers).
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Total number of events emitted since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("emitted", &self.total_emitted())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Subscription handle for receiving events from the [`EventBus`].
pub struct EventSubscriber {
    receiver: broadcast::Receiver<RunEvent>,
}

impl EventSubscriber {
    /// Receive the next event, waiting asynchronously.
    ///
    /// Returns `None` once the sender side is gone. Lagged gaps are
    /// skipped silently.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<RunEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.try_recv() {
            out.push(event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn started(run_id: RunId) -> RunEvent {
        RunEvent::WorkflowStarted {
            run_id,
            workflow_id: WorkflowId::v4(),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(started(RunId::v4()));
        assert_eq!(bus.total_emitted(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_receives_via_try_recv() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();
        let run_id = RunId::v4();

        bus.emit(RunEvent::WorkflowCompleted { run_id });

        let event = sub.try_recv().expect("should receive event");
        assert_eq!(event, RunEvent::WorkflowCompleted { run_id });
    }

    #[tokio::test]
    async fn subscriber_receives_via_recv() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();
        let run_id = RunId::v4();

        bus.emit(RunEvent::WorkflowFailed {
            run_id,
            reason: "boom".into(),
        });

        match sub.recv().await.expect("should receive event") {
            RunEvent::WorkflowFailed { reason, .. } => assert_eq!(reason, "boom"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new(16);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.emit(started(RunId::v4()));

        assert!(sub1.try_recv().is_some());
        assert!(sub2.try_recv().is_some());
    }

    #[test]
    fn drain_collects_buffered_events() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();
        let run_id = RunId::v4();

        bus.emit(started(run_id));
        bus.emit(RunEvent::WorkflowCompleted { run_id });

        let drained = sub.drain();
        assert_eq!(drained.len(), 2);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn run_id_accessor_covers_all_variants() {
        let run_id = RunId::v4();
        let events = vec![
            started(run_id),
            RunEvent::TokenSpawned {
                run_id,
                token: TokenId::new(1),
                node: NodeRef::from("n"),
                path: TokenPath::root(),
            },
            RunEvent::NodeStarted {
                run_id,
                token: TokenId::new(1),
                node: NodeRef::from("n"),
            },
            RunEvent::NodeCompleted {
                run_id,
                token: TokenId::new(1),
                node: NodeRef::from("n"),
            },
            RunEvent::FanInActivated {
                run_id,
                fan_in_path: "g:t".into(),
                merged: vec![TokenId::new(1)],
            },
            RunEvent::BranchesMerged {
                run_id,
                target: "state.xs".into(),
                contributors: 3,
            },
            RunEvent::WorkflowCompleted { run_id },
            RunEvent::WorkflowFailed {
                run_id,
                reason: "r".into(),
            },
            RunEvent::Trace {
                run_id,
                trace: TraceEvent::DispatchBatch {
                    token: None,
                    node: None,
                    decisions: 0,
                },
            },
        ];
        for event in &events {
            assert_eq!(event.run_id(), run_id);
        }
    }

    #[test]
    fn serde_roundtrip() {
        let event = RunEvent::FanInActivated {
            run_id: RunId::v4(),
            fan_in_path: "fan:collect".into(),
            merged: vec![TokenId::new(2), TokenId::new(3)],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"fan_in_activated\""));
        let back: RunEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
