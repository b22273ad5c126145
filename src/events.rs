use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Domain events published by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(i64),
    ProductUpdated(i64),
    ProductArchived(i64),

    // Cart events
    CartItemAdded { cart_id: i64, product_id: i64 },
    CartItemRemoved { cart_id: i64, product_id: i64 },
    CartCleared(i64),

    // Order events
    OrderPlaced(i64),
    OrderCompleted(i64),
    OrderStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
    },

    // Payment events
    PaymentFailed { order_id: i64, reason: String },

    // Inventory events
    StockDeducted(i64),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Event publication is observability plumbing and must never abort the
    /// operation that produced the event.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Dropped event: {}", err);
        }
    }
}

/// Background consumer for the event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPlaced(order_id) => info!(order_id, "order placed"),
            Event::OrderCompleted(order_id) => info!(order_id, "order completed"),
            Event::PaymentFailed { order_id, reason } => {
                warn!(order_id, reason = %reason, "payment failed")
            }
            Event::StockDeducted(order_id) => info!(order_id, "stock deducted"),
            other => info!(event = ?other, "event"),
        }
    }
    info!("Event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender.send(Event::OrderPlaced(7)).await.expect("send");

        match rx.recv().await {
            Some(Event::OrderPlaced(7)) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out.
        sender.send_or_log(Event::OrderCompleted(1)).await;
    }
}
