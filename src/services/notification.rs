use crate::database::repository::Order;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    OrderConfirmed,
}

/// Downstream hook fired once when an order is confirmed.
/// Delivery (email, push) belongs to the implementor.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn notify(&self, order: &Order, notification_type: NotificationType);
}

/// Emits the notification as a structured log line
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderNotifier for LoggingNotifier {
    async fn notify(&self, order: &Order, notification_type: NotificationType) {
        match notification_type {
            NotificationType::OrderConfirmed => {
                info!(
                    order_number = %order.order_number,
                    customer_id = %order.customer_id,
                    payment_method = %order.payment_method,
                    total = %order.total,
                    "🔔 NOTIFICATION: Order Confirmed"
                );
            }
        }
    }
}
