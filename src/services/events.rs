//! Event bus for CRM mutations
//!
//! Services emit an event after each successful write. Listeners subscribe
//! for audit logging or follow-up work; a send with no subscribers is dropped.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

/// Events emitted by the parent service after a committed write
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    ParentCreated {
        customer_id: String,
        parent_id: String,
        children: usize,
    },
    ParentUpdated {
        customer_id: String,
        parent_id: String,
        status: String,
        stage: String,
    },
    ParentDeleted {
        customer_id: String,
        parent_id: String,
    },
    ChildAdded {
        customer_id: String,
        parent_id: String,
        child_id: i32,
    },
    NoteAdded {
        customer_id: String,
        parent_id: String,
        note_id: i32,
        created_by: String,
    },
    EmailRecorded {
        customer_id: String,
        parent_id: String,
        direction: String,
    },
    TaskCreated {
        customer_id: String,
        parent_id: String,
        task_id: i32,
    },
}

impl StorageEvent {
    pub fn customer_id(&self) -> &str {
        match self {
            StorageEvent::ParentCreated { customer_id, .. }
            | StorageEvent::ParentUpdated { customer_id, .. }
            | StorageEvent::ParentDeleted { customer_id, .. }
            | StorageEvent::ChildAdded { customer_id, .. }
            | StorageEvent::NoteAdded { customer_id, .. }
            | StorageEvent::EmailRecorded { customer_id, .. }
            | StorageEvent::TaskCreated { customer_id, .. } => customer_id,
        }
    }
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StorageEvent);
}

/// Broadcast channel shared by all services
pub struct EventBus {
    sender: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: StorageEvent) {
        trace!(event = ?event, "Emitting storage event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes an audit line per event
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &StorageEvent) {
        match event {
            StorageEvent::ParentCreated {
                customer_id,
                parent_id,
                children,
            } => {
                info!(customer_id = %customer_id, parent_id = %parent_id, children, "Parent created");
            }
            StorageEvent::ParentUpdated {
                customer_id,
                parent_id,
                status,
                stage,
            } => {
                info!(
                    customer_id = %customer_id,
                    parent_id = %parent_id,
                    status = %status,
                    stage = %stage,
                    "Parent updated"
                );
            }
            StorageEvent::ParentDeleted {
                customer_id,
                parent_id,
            } => {
                info!(customer_id = %customer_id, parent_id = %parent_id, "Parent deleted");
            }
            _ => {
                trace!(customer_id = event.customer_id(), event = ?event, "Storage event");
            }
        }
    }
}

/// Spawn a background task that feeds every event to the logging listener
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    trace!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(StorageEvent::NoteAdded {
            customer_id: "T1".into(),
            parent_id: "PARENT-00000001".into(),
            note_id: 7,
            created_by: "user-1".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        assert_eq!(event.customer_id(), "T1");
        match event {
            StorageEvent::NoteAdded { note_id, created_by, .. } => {
                assert_eq!(note_id, 7);
                assert_eq!(created_by, "user-1");
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(StorageEvent::ParentDeleted {
            customer_id: "T1".into(),
            parent_id: "PARENT-00000001".into(),
        });
    }

    #[tokio::test]
    async fn test_logging_listener_stops_when_bus_dropped() {
        let bus = Arc::new(EventBus::new());
        let handle = spawn_logging_listener(bus.clone());
        bus.emit(StorageEvent::ParentCreated {
            customer_id: "T1".into(),
            parent_id: "PARENT-00000001".into(),
            children: 0,
        });
        drop(bus);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop")
            .expect("listener panicked");
    }
}
