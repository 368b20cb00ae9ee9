use crate::entities::order::OrderStatus;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod outbox;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, waiting for channel capacity
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort emission; a full or closed channel only logs.
    pub fn emit(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            counter!("marketplace.events.dropped", 1);
            warn!("dropping in-process event: {}", e);
        }
    }
}

/// Things that happened to orders and staged checkouts.
///
/// The first three are also persisted through the outbox and drive notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        product_id: Uuid,
        customer_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    PaymentReceived {
        order_id: Uuid,
        order_number: String,
        product_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        product_id: Uuid,
        customer_id: Uuid,
        status: OrderStatus,
        changed_by_customer: bool,
    },
    #[serde(rename_all = "camelCase")]
    CheckoutCompensated {
        temp_order_id: Uuid,
        orders_removed: usize,
    },
    #[serde(rename_all = "camelCase")]
    StagedCheckoutExpired { temp_order_id: Uuid, orders: usize },
    OrphanedOrdersCancelled { count: usize },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "orderPlaced",
            Event::PaymentReceived { .. } => "paymentReceived",
            Event::OrderStatusChanged { .. } => "orderStatusChanged",
            Event::CheckoutCompensated { .. } => "checkoutCompensated",
            Event::StagedCheckoutExpired { .. } => "stagedCheckoutExpired",
            Event::OrphanedOrdersCancelled { .. } => "orphanedOrdersCancelled",
        }
    }

    /// The order an event is about, if any
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Event::OrderPlaced { order_id, .. }
            | Event::PaymentReceived { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("marketplace.events.processed", 1, "event" => event.name());
        match &event {
            Event::CheckoutCompensated {
                temp_order_id,
                orders_removed,
            } => info!(%temp_order_id, orders_removed, "staged checkout compensated"),
            Event::StagedCheckoutExpired {
                temp_order_id,
                orders,
            } => info!(%temp_order_id, orders, "staged checkout expired"),
            Event::OrphanedOrdersCancelled { count } => {
                info!(count, "orphaned gateway orders cancelled")
            }
            other => info!(event = other.name(), order_id = ?other.order_id(), "order event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(Event::PaymentReceived {
            order_id: id,
            order_number: "ORD-12345".into(),
            product_id: id,
        })
        .unwrap();
        assert_eq!(value["type"], "paymentReceived");
        assert_eq!(value["orderNumber"], "ORD-12345");

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back.order_id(), Some(id));
    }

    #[tokio::test]
    async fn emit_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSender::new(tx).emit(Event::OrphanedOrdersCancelled { count: 1 });
    }
}
