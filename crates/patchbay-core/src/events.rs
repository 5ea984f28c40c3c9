//! Typed runtime event bus
//!
//! In-process event distribution over a tokio broadcast channel. The provider
//! owns one bus; external admin and monitoring components subscribe to it,
//! and the initialization context uses it to wait for factories registered
//! after a service was declared.

use crate::state::ServiceState;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Lifecycle events published by a service provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RuntimeEvent {
    /// A service committed a state transition
    ServiceStateChanged {
        /// Name of the service
        service: String,
        /// State before the transition
        from: ServiceState,
        /// State after the transition
        to: ServiceState,
    },
    /// A service factory became available
    ServiceFactoryRegistered {
        /// Factory type name
        type_name: String,
    },
    /// An interceptor factory became available
    InterceptorFactoryRegistered {
        /// Factory type name
        type_name: String,
    },
}

/// Broadcast bus carrying [`RuntimeEvent`]s to all active subscribers
///
/// Events are fanned out without persistence; emitting with no subscribers
/// is not an error.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the default capacity (1024)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn emit(&self, event: RuntimeEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(RuntimeEvent::ServiceFactoryRegistered {
            type_name: "test".into(),
        });

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                RuntimeEvent::ServiceFactoryRegistered { type_name } => {
                    assert_eq!(type_name, "test");
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(RuntimeEvent::ServiceStateChanged {
            service: "s".into(),
            from: ServiceState::Stopped,
            to: ServiceState::Starting,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
