//! Stock event bus
//!
//! Ledger mutations are announced on a broadcast channel so observers
//! (dashboards, notification relays) can refresh without polling.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StockEvent {
    /// A product quantity changed
    StockUpdated { structure_id: Uuid, product_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct StockEvents {
    sender: broadcast::Sender<StockEvent>,
}

impl StockEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.sender.subscribe()
    }

    /// Publish without waiting; having no subscriber is not an error.
    pub fn publish(&self, event: StockEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(receivers, "stock event published"),
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(?event, "no subscriber for stock event")
            }
        }
    }

    pub fn stock_updated(&self, structure_id: Uuid, product_id: Uuid) {
        self.publish(StockEvent::StockUpdated {
            structure_id,
            product_id,
        });
    }
}

impl Default for StockEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
