use crate::entities::{recent_activity, seller_notification};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::catalog;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Turns delivered order events into seller notifications and customer activity entries.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Writes every record for `event` in one transaction, so a retried event is not half-applied.
    #[instrument(skip(self, event), fields(event = event.name()))]
    pub async fn handle(&self, event: &Event) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        match event {
            Event::OrderPlaced {
                order_id,
                order_number,
                product_id,
                customer_id,
            } => {
                if let Some(product) = catalog::find_product(&txn, *product_id).await? {
                    notify_seller(
                        &txn,
                        product.seller_id,
                        *order_id,
                        "order placed",
                        format!("An order has been placed for '{}'", product.title),
                    )
                    .await?;
                } else {
                    debug!(%product_id, "product missing; skipping seller notification");
                }
                record_activity(
                    &txn,
                    *customer_id,
                    *order_id,
                    "order added".to_string(),
                    format!("Your order #{} has been placed", order_number),
                )
                .await?;
            }
            Event::PaymentReceived {
                order_id,
                order_number,
                product_id,
            } => {
                if let Some(product) = catalog::find_product(&txn, *product_id).await? {
                    notify_seller(
                        &txn,
                        product.seller_id,
                        *order_id,
                        "Payment Received",
                        format!("You have received payment for order ID #{}", order_number),
                    )
                    .await?;
                }
            }
            Event::OrderStatusChanged {
                order_id,
                order_number,
                product_id,
                customer_id,
                status,
                changed_by_customer,
            } => {
                record_activity(
                    &txn,
                    *customer_id,
                    *order_id,
                    format!("order {}", status),
                    format!("Your order #{} has been {}", order_number, status),
                )
                .await?;

                if *changed_by_customer {
                    if let Some(product) = catalog::find_product(&txn, *product_id).await? {
                        notify_seller(
                            &txn,
                            product.seller_id,
                            *order_id,
                            &format!("Order {}", status),
                            format!(
                                "Order #{} has been {} by the customer.",
                                order_number, status
                            ),
                        )
                        .await?;
                    }
                }
            }
            // settlement bookkeeping; nobody is notified
            Event::CheckoutCompensated { .. }
            | Event::StagedCheckoutExpired { .. }
            | Event::OrphanedOrdersCancelled { .. } => {}
        }

        txn.commit().await?;
        Ok(())
    }
}

async fn notify_seller<C: ConnectionTrait>(
    conn: &C,
    seller_id: Uuid,
    order_id: Uuid,
    notification_type: &str,
    description: String,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    seller_notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        notification_type: Set(notification_type.to_string()),
        order_id: Set(order_id),
        seller_id: Set(seller_id),
        description: Set(Some(description)),
        timestamp: Set(now),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(())
}

async fn record_activity<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    order_id: Uuid,
    activity_type: String,
    activity_status: String,
) -> Result<(), ServiceError> {
    recent_activity::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        order_id: Set(Some(order_id)),
        activity_type: Set(activity_type),
        activity_status: Set(activity_status),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}
