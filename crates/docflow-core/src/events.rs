//! Server event types and event bus for real-time notifications.
//!
//! Aggregates events from the pipeline, queue worker, and chat service into
//! a single broadcast channel. Downstream consumers (webhook outbox,
//! telemetry) subscribe independently.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::defaults;

/// Events broadcast to subscribed consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A document entered processing.
    DocumentProcessing { document_id: Uuid },
    /// A document finished processing successfully.
    DocumentProcessed {
        document_id: Uuid,
        field_count: usize,
        chunk_count: usize,
    },
    /// A document failed processing.
    DocumentFailed { document_id: Uuid, error: String },
    /// A queue item completed.
    QueueItemCompleted { item_id: Uuid, document_id: Uuid },
    /// A queue item was rescheduled for retry.
    QueueItemRetried {
        item_id: Uuid,
        document_id: Uuid,
        attempts: i32,
        delay_secs: i64,
    },
    /// A queue item exhausted its attempts and dead-lettered.
    QueueItemDeadLettered {
        item_id: Uuid,
        document_id: Uuid,
        error: String,
    },
    /// An assistant chat message was produced.
    ChatMessage {
        session_id: Uuid,
        document_id: Uuid,
        message_id: Uuid,
    },
}

impl ServerEvent {
    /// Dot-namespaced event type name used for webhook filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::DocumentProcessing { .. } => "document.processing",
            ServerEvent::DocumentProcessed { .. } => "document.processed",
            ServerEvent::DocumentFailed { .. } => "document.failed",
            ServerEvent::QueueItemCompleted { .. } => "queue.item_completed",
            ServerEvent::QueueItemRetried { .. } => "queue.item_retried",
            ServerEvent::QueueItemDeadLettered { .. } => "queue.item_dead_lettered",
            ServerEvent::ChatMessage { .. } => "chat.message",
        }
    }

    /// Document this event relates to, when one applies.
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::DocumentProcessing { document_id }
            | ServerEvent::DocumentProcessed { document_id, .. }
            | ServerEvent::DocumentFailed { document_id, .. }
            | ServerEvent::QueueItemCompleted { document_id, .. }
            | ServerEvent::QueueItemRetried { document_id, .. }
            | ServerEvent::QueueItemDeadLettered { document_id, .. }
            | ServerEvent::ChatMessage { document_id, .. } => Some(*document_id),
        }
    }
}

/// Broadcast bus for server events.
///
/// Cloning shares the underlying channel. Emitting with no subscribers is
/// not an error; the event is simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let id = Uuid::new_v4();
        bus.emit(ServerEvent::DocumentProcessing { document_id: id });

        let event = rx.recv().await.unwrap();
        match event {
            ServerEvent::DocumentProcessing { document_id } => assert_eq!(document_id, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(ServerEvent::DocumentFailed {
            document_id: Uuid::new_v4(),
            error: "boom".to_string(),
        });
    }

    #[test]
    fn test_event_type_names_are_namespaced() {
        let event = ServerEvent::QueueItemDeadLettered {
            item_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            error: "exhausted".to_string(),
        };
        assert_eq!(event.event_type(), "queue.item_dead_lettered");
    }

    #[test]
    fn test_document_id_extraction() {
        let id = Uuid::new_v4();
        let event = ServerEvent::DocumentProcessed {
            document_id: id,
            field_count: 3,
            chunk_count: 7,
        };
        assert_eq!(event.document_id(), Some(id));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ServerEvent::DocumentProcessing {
            document_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "document_processing");
    }
}
