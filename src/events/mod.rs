use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{ProductionOrderStatus, StockLocation};
use crate::quantity::Quantity;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Sends an event after state has already been persisted. Failures are
    /// logged and otherwise ignored.
    pub async fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, "Dropping event: {}", e);
        }
    }
}

/// Things the engine reports after a mutation has been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MaterialsReserved {
        production_order_id: Uuid,
        reserved_items: usize,
        completed_items: usize,
        status: ProductionOrderStatus,
    },
    MaterialsUnreserved {
        production_order_id: Uuid,
        released_entries: usize,
    },
    StockTransferred {
        product_id: Uuid,
        from: StockLocation,
        to: StockLocation,
        quantity: Quantity,
        moved_reservations: usize,
    },
    StockEntered {
        availability_id: Uuid,
        product_id: Uuid,
        location: StockLocation,
        quantity: Quantity,
    },
    StockExited {
        availability_id: Uuid,
        product_id: Uuid,
        location: StockLocation,
        quantity: Quantity,
    },
    AvailabilityDepleted {
        availability_id: Uuid,
        product_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::MaterialsReserved { .. } => "materials_reserved",
            Event::MaterialsUnreserved { .. } => "materials_unreserved",
            Event::StockTransferred { .. } => "stock_transferred",
            Event::StockEntered { .. } => "stock_entered",
            Event::StockExited { .. } => "stock_exited",
            Event::AvailabilityDepleted { .. } => "availability_depleted",
        }
    }
}

// Handlers receive every event drained from the channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Writes each event to the log as JSON.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        info!(event = event.name(), %payload, "engine event");
        Ok(())
    }
}

/// Drains `rx` until every sender is dropped, fanning each event out to `handlers`.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!("Received event: {:?}", event);
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(event = event.name(), "Event handler failed: {}", e);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle_event(&self, _event: &Event) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_reach_every_handler() {
        let (sender, rx) = EventSender::channel(8);
        let counter = Arc::new(Counting::default());
        let worker = tokio::spawn(process_events(
            rx,
            vec![
                counter.clone() as Arc<dyn EventHandler>,
                Arc::new(LoggingEventHandler),
            ],
        ));

        sender
            .send(Event::AvailabilityDepleted {
                availability_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        drop(sender);
        worker.await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publishing_to_a_closed_channel_is_not_fatal() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);

        let event = Event::MaterialsUnreserved {
            production_order_id: Uuid::new_v4(),
            released_entries: 0,
        };
        assert!(matches!(
            sender.send(event.clone()).await,
            Err(ServiceError::EventError(_))
        ));
        sender.publish(event).await;
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let json = serde_json::to_value(Event::MaterialsReserved {
            production_order_id: Uuid::nil(),
            reserved_items: 2,
            completed_items: 1,
            status: ProductionOrderStatus::PartialBooked,
        })
        .unwrap();
        assert_eq!(json["type"], "materials_reserved");
        assert_eq!(json["status"], "partialBooked");
    }
}
