//! Node lifecycle event broadcasting.
//!
//! Transitions are posted to an unbounded channel and delivered by a
//! dedicated dispatcher task, so a slow or failing listener can never stall
//! a transition or shutdown progress. Registration goes through the same
//! channel: the dispatcher first replays every known node's current state to
//! the new listener, then delivers live events, so a listener sees each
//! node's complete transition history regardless of when it registered.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::node::{Node, NodeState};

/// Observer of node lifecycle transitions.
pub trait NodeStateListener: Send + Sync + 'static {
    fn node_state_changed(&self, node: &Node, state: NodeState);
}

enum HubMessage {
    Register(Arc<dyn NodeStateListener>),
    Transition(Node, NodeState),
}

/// Sender half handed to each node at attach time.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<HubMessage>,
}

impl EventSender {
    pub(crate) fn transition(&self, node: Node, state: NodeState) {
        let _ = self.tx.send(HubMessage::Transition(node, state));
    }
}

/// Per-cluster event channel plus its dispatcher task.
pub(crate) struct EventHub {
    tx: mpsc::UnboundedSender<HubMessage>,
}

impl EventHub {
    /// Spawns the dispatcher task. Must be called within a Tokio runtime.
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(rx));
        Self { tx }
    }

    pub(crate) fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn register(&self, listener: Arc<dyn NodeStateListener>) {
        let _ = self.tx.send(HubMessage::Register(listener));
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<HubMessage>) {
    let mut listeners: Vec<Arc<dyn NodeStateListener>> = Vec::new();
    // Last known state per node, in node insertion order.
    let mut known: Vec<(Node, NodeState)> = Vec::new();

    while let Some(message) = rx.recv().await {
        match message {
            HubMessage::Register(listener) => {
                for (node, state) in &known {
                    listener.node_state_changed(node, *state);
                }
                listeners.push(listener);
            }
            HubMessage::Transition(node, state) => {
                match known.iter_mut().find(|(n, _)| n.same_node(&node)) {
                    Some(entry) => entry.1 = state,
                    None => known.push((node.clone(), state)),
                }
                for listener in &listeners {
                    listener.node_state_changed(&node, state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, NodeState)>>,
    }

    impl NodeStateListener for Recorder {
        fn node_state_changed(&self, node: &Node, state: NodeState) {
            self.events
                .lock()
                .unwrap()
                .push((node.addr().to_string(), state));
        }
    }

    async fn wait_for_events(recorder: &Recorder, count: usize) -> Vec<(String, NodeState)> {
        for _ in 0..100 {
            {
                let events = recorder.events.lock().unwrap();
                if events.len() >= count {
                    return events.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        recorder.events.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_registration_replays_current_states() {
        let hub = EventHub::new();
        let sender = hub.sender();

        let node_a = NodeBuilder::new().with_remote_port(9001).build();
        let node_b = NodeBuilder::new().with_remote_port(9002).build();

        sender.transition(node_a.clone(), NodeState::Created);
        sender.transition(node_b.clone(), NodeState::Created);
        sender.transition(node_a.clone(), NodeState::Running);

        let recorder = Arc::new(Recorder::default());
        hub.register(recorder.clone());

        let events = wait_for_events(&recorder, 2).await;
        assert_eq!(
            events,
            vec![
                (node_a.addr().to_string(), NodeState::Running),
                (node_b.addr().to_string(), NodeState::Created),
            ]
        );
    }

    #[tokio::test]
    async fn test_live_events_follow_replay() {
        let hub = EventHub::new();
        let sender = hub.sender();
        let node = NodeBuilder::new().with_remote_port(9003).build();

        sender.transition(node.clone(), NodeState::Created);

        let recorder = Arc::new(Recorder::default());
        hub.register(recorder.clone());
        sender.transition(node.clone(), NodeState::Running);
        sender.transition(node.clone(), NodeState::ShuttingDown);

        let events = wait_for_events(&recorder, 3).await;
        let states: Vec<NodeState> = events.into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            states,
            vec![
                NodeState::Created,
                NodeState::Running,
                NodeState::ShuttingDown
            ]
        );
    }
}
