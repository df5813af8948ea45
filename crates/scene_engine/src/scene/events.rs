//! Scene membership events
//!
//! Structural changes post an event; queued events are delivered after the
//! step barrier (or immediately after an out-of-step change) to the
//! handlers registered for that event type. A handler returning `true`
//! consumes the event and stops forwarding.

use std::collections::HashMap;

use super::node_list::NodeIndex;

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEventType {
    /// Node joined the stepped node list
    NodeAdded,
    /// Node left the stepped node list
    NodeRemoved,
    /// Node was destroyed and its slot reclaimed
    NodeDeleted,
}

/// A single structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneEvent {
    /// What happened
    pub event_type: SceneEventType,
    /// External id of the affected node
    pub node_id: u64,
    /// Slot the node lived in when the event was posted
    pub index: NodeIndex,
    /// Step counter at the time of posting
    pub step: u64,
}

/// Receives scene events
pub trait SceneEventHandler: Send {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &SceneEvent) -> bool;
}

/// Event queue with per-type handler chains
#[derive(Default)]
pub struct SceneEvents {
    queue: Vec<SceneEvent>,
    handlers: HashMap<SceneEventType, Vec<Box<dyn SceneEventHandler>>>,
}

impl SceneEvents {
    /// Create an empty queue with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type; handlers run in registration order
    pub fn register_handler(
        &mut self,
        event_type: SceneEventType,
        handler: Box<dyn SceneEventHandler>,
    ) {
        self.handlers.entry(event_type).or_default().push(handler);
    }

    /// Queue an event for the next dispatch
    pub fn post(&mut self, event: SceneEvent) {
        log::trace!(
            "Scene event {:?} for node {} at {}",
            event.event_type,
            event.node_id,
            event.index
        );
        self.queue.push(event);
    }

    /// Deliver all queued events in posting order
    pub fn dispatch(&mut self) -> usize {
        let queued = std::mem::take(&mut self.queue);
        let count = queued.len();
        for event in &queued {
            self.dispatch_event(event);
        }
        count
    }

    fn dispatch_event(&mut self, event: &SceneEvent) {
        if let Some(handlers) = self.handlers.get_mut(&event.event_type) {
            for handler in handlers.iter_mut() {
                if handler.on_event(event) {
                    break;
                }
            }
        }
    }

    /// Events waiting for dispatch
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drop queued events without delivering them
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<(SceneEventType, u64)>>>,
        consume: bool,
    }

    impl SceneEventHandler for Recorder {
        fn on_event(&mut self, event: &SceneEvent) -> bool {
            self.seen.lock().unwrap().push((event.event_type, event.node_id));
            self.consume
        }
    }

    fn event(event_type: SceneEventType, node_id: u64) -> SceneEvent {
        SceneEvent {
            event_type,
            node_id,
            index: NodeIndex::from_raw(0),
            step: 0,
        }
    }

    #[test]
    fn test_dispatch_in_posting_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = SceneEvents::new();
        for event_type in [SceneEventType::NodeAdded, SceneEventType::NodeDeleted] {
            events.register_handler(
                event_type,
                Box::new(Recorder {
                    seen: Arc::clone(&seen),
                    consume: false,
                }),
            );
        }

        events.post(event(SceneEventType::NodeDeleted, 7));
        events.post(event(SceneEventType::NodeAdded, 3));
        events.post(event(SceneEventType::NodeRemoved, 9));
        assert_eq!(events.dispatch(), 3);
        assert_eq!(events.pending(), 0);

        // NodeRemoved has no handler
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(SceneEventType::NodeDeleted, 7), (SceneEventType::NodeAdded, 3)]
        );
    }

    #[test]
    fn test_consumed_event_stops_forwarding() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let mut events = SceneEvents::new();
        events.register_handler(
            SceneEventType::NodeAdded,
            Box::new(Recorder {
                seen: Arc::clone(&first),
                consume: true,
            }),
        );
        events.register_handler(
            SceneEventType::NodeAdded,
            Box::new(Recorder {
                seen: Arc::clone(&second),
                consume: false,
            }),
        );

        events.post(event(SceneEventType::NodeAdded, 1));
        events.dispatch();

        assert_eq!(first.lock().unwrap().len(), 1);
        assert!(second.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clear_drops_queue() {
        let mut events = SceneEvents::new();
        events.post(event(SceneEventType::NodeRemoved, 1));
        events.clear();
        assert_eq!(events.dispatch(), 0);
    }
}
