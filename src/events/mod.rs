use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Events describe committed work, so a lost event never undoes it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping event");
        }
    }
}

/// Things that happened, published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        cancelled_by: Uuid,
    },

    // Inventory events
    InventoryReserved {
        variant_id: Uuid,
        order_id: Uuid,
        quantity: i32,
        remaining: i32,
    },
    InventoryRestocked {
        variant_id: Uuid,
        order_id: Uuid,
        quantity: i32,
    },
    InventoryAdjusted {
        variant_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },

    // Coupon events
    CouponRedeemed {
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    },
    CouponReleased {
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(%order_id, %user_id, %total_amount, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::OrderCancelled {
                order_id,
                cancelled_by,
            } => {
                info!(%order_id, %cancelled_by, "Order cancelled");
            }
            Event::InventoryReserved {
                variant_id,
                remaining,
                ..
            } if *remaining == 0 => {
                warn!(%variant_id, "Variant sold out");
            }
            Event::InventoryAdjusted {
                variant_id,
                old_quantity,
                new_quantity,
            } => {
                info!(%variant_id, old_quantity, new_quantity, "Inventory adjusted");
            }
            other => {
                debug!(event = ?other, "Event processed");
            }
        }
    }

    warn!("Event processing loop has ended");
}
