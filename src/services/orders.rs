use crate::{
    auth::Actor,
    entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus},
    entities::{customer, product, Customer, Order, Product},
    errors::ServiceError,
    events::{outbox, Event},
    services::{catalog, order_ids, shipping, shipping::ShippingInfoView},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Inserts retried after a unique-constraint collision on the identifiers
const MAX_INSERT_ATTEMPTS: usize = 5;

/// The pseudo-status that clones an order instead of moving it
pub const BUY_AGAIN: &str = "buy again";

/// Input to the order factory
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub payment_method: PaymentMethod,
    pub shipping_info_id: Uuid,
}

impl From<&order::Model> for NewOrder {
    fn from(existing: &order::Model) -> Self {
        Self {
            customer_id: existing.customer_id,
            product_id: existing.product_id,
            quantity: existing.quantity,
            price: existing.price,
            payment_method: existing.payment_method,
            shipping_info_id: existing.shipping_info_id,
        }
    }
}

/// Creates a `pending/pending` order with fresh identifiers.
///
/// The insert runs under a savepoint of `txn`; a collision on either unique identifier rolls the
/// savepoint back and redraws both.
pub async fn create_order(
    txn: &DatabaseTransaction,
    new: &NewOrder,
) -> Result<order::Model, ServiceError> {
    insert_order(txn, new, Vec::new()).await
}

/// Like [`create_order`], but tries the given `(order_number, transaction_id)` pairs in order
/// before drawing fresh ones.
async fn insert_order(
    txn: &DatabaseTransaction,
    new: &NewOrder,
    candidates: Vec<(String, String)>,
) -> Result<order::Model, ServiceError> {
    let mut candidates = candidates.into_iter();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let (order_number, transaction_id) = match candidates.next() {
            Some(pair) => pair,
            None => (
                order_ids::unique_order_number(txn).await?,
                order_ids::unique_transaction_id(txn).await?,
            ),
        };

        let savepoint = txn.begin().await?;
        let now = Utc::now();
        let inserted = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number),
            transaction_id: Set(transaction_id),
            customer_id: Set(new.customer_id),
            product_id: Set(new.product_id),
            quantity: Set(new.quantity),
            price: Set(new.price),
            shipping_info_id: Set(new.shipping_info_id),
            payment_status: Set(PaymentStatus::Pending),
            order_status: Set(OrderStatus::Pending),
            payment_method: Set(new.payment_method),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&savepoint)
        .await
        .map_err(ServiceError::from);

        match inserted {
            Ok(model) => {
                savepoint.commit().await?;
                counter!("marketplace.orders.created", 1);
                return Ok(model);
            }
            Err(e) if e.is_unique_violation() && attempt < MAX_INSERT_ATTEMPTS => {
                savepoint.rollback().await?;
                counter!("marketplace.orders.identifier_collisions", 1);
                warn!(attempt, "order identifier collision; redrawing");
            }
            Err(e) => {
                savepoint.rollback().await?;
                return Err(e);
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1, message = "orderStatus is required"))]
    pub order_status: String,
}

/// Requested change: a fulfillment move or a clone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Move(OrderStatus),
    BuyAgain,
}

impl FromStr for StatusChange {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(BUY_AGAIN) {
            return Ok(StatusChange::BuyAgain);
        }
        OrderStatus::from_str(raw)
            .map(StatusChange::Move)
            .map_err(|_| ServiceError::BadRequest(format!("Invalid order status: {}", raw)))
    }
}

#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Updated(order::Model),
    Reordered(order::Model),
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub status: OrderStatus,
    pub product_title: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    #[serde(flatten)]
    pub order: order::Model,
    pub product_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: i32,
    pub customer_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub category: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
    pub sku: String,
    pub quantity: i32,
    pub negotiable: bool,
    pub stock_status: String,
    pub first_image_url: Option<String>,
}

impl From<&product::Model> for ProductDetail {
    fn from(p: &product::Model) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            price: p.price,
            sale_price: p.sale_price,
            category: p.category.clone(),
            brand: p.brand.clone(),
            model: p.model.clone(),
            condition: p.condition.clone(),
            sku: p.sku.clone(),
            quantity: p.quantity,
            negotiable: p.negotiable,
            stock_status: p.stock_status().to_string(),
            first_image_url: p.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrderDetail {
    pub id: Uuid,
    pub order_number: String,
    pub quantity: i32,
    pub price: Decimal,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub product: ProductDetail,
    pub shipping_info: Option<ShippingInfoView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub pending: u64,
    pub shipped: u64,
    pub delivered: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    fn add(&mut self, status: OrderStatus, count: u64) {
        match status {
            OrderStatus::Pending => self.pending += count,
            OrderStatus::Shipped => self.shipped += count,
            OrderStatus::Delivered => self.delivered += count,
            OrderStatus::Cancelled => self.cancelled += count,
        }
    }
}

/// Customer and seller views over placed orders, plus fulfillment updates
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The customer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn customer_orders(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<CustomerOrderView>, ServiceError> {
        let orders = self.orders_of_customer(customer_id).await?;
        let titles = catalog::product_titles(&*self.db, &product_ids(&orders)).await?;

        Ok(orders
            .into_iter()
            .map(|order| CustomerOrderView {
                status: order.order_status,
                product_title: titles
                    .get(&order.product_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown Product".to_string()),
                order,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn customer_payments(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<PaymentView>, ServiceError> {
        let orders = self.orders_of_customer(customer_id).await?;
        let titles = catalog::product_titles(&*self.db, &product_ids(&orders)).await?;

        Ok(orders
            .into_iter()
            .map(|order| PaymentView {
                product_title: titles.get(&order.product_id).cloned(),
                order,
            })
            .collect())
    }

    /// Orders for any of the seller's products, newest first.
    #[instrument(skip(self))]
    pub async fn seller_orders(
        &self,
        seller_id: Uuid,
    ) -> Result<Vec<SellerOrderSummary>, ServiceError> {
        let products = catalog::seller_product_ids(&*self.db, seller_id).await?;
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let orders = Order::find()
            .filter(order::Column::ProductId.is_in(products))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let customer_ids: Vec<Uuid> = orders.iter().map(|o| o.customer_id).collect();
        let names: HashMap<Uuid, String> = Customer::find()
            .filter(customer::Column::Id.is_in(customer_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.display_name()))
            .collect();

        Ok(orders
            .into_iter()
            .map(|o| SellerOrderSummary {
                id: o.id,
                customer_name: names.get(&o.customer_id).cloned().unwrap_or_default(),
                order_number: o.order_number,
                status: o.order_status,
                price: o.price,
                quantity: o.quantity,
                created_at: o.created_at,
                updated_at: o.updated_at,
            })
            .collect())
    }

    /// One order of the seller's, addressed by UUID or `ORD-` number.
    #[instrument(skip(self))]
    pub async fn seller_order(
        &self,
        seller_id: Uuid,
        key: &str,
    ) -> Result<SellerOrderDetail, ServiceError> {
        let not_found = || ServiceError::NotFound("Order not found or unauthorized".to_string());

        let query = if let Ok(id) = Uuid::parse_str(key) {
            Order::find_by_id(id)
        } else if order_ids::is_order_number(key) {
            Order::find().filter(order::Column::OrderNumber.eq(key))
        } else {
            return Err(not_found());
        };

        let order = query.one(&*self.db).await?.ok_or_else(not_found)?;
        let product = Product::find_by_id(order.product_id)
            .filter(product::Column::SellerId.eq(seller_id))
            .one(&*self.db)
            .await?
            .ok_or_else(not_found)?;
        let shipping_info = shipping::load_shipping_view(&*self.db, order.shipping_info_id).await?;

        Ok(SellerOrderDetail {
            id: order.id,
            order_number: order.order_number,
            quantity: order.quantity,
            price: order.price,
            payment_status: order.payment_status,
            order_status: order.order_status,
            payment_method: order.payment_method,
            created_at: order.created_at,
            updated_at: order.updated_at,
            product: ProductDetail::from(&product),
            shipping_info,
        })
    }

    /// Per-status order counts over the seller's products.
    #[instrument(skip(self))]
    pub async fn status_counts(&self, seller_id: Uuid) -> Result<StatusCounts, ServiceError> {
        let mut counts = StatusCounts::default();
        let products = catalog::seller_product_ids(&*self.db, seller_id).await?;
        if products.is_empty() {
            return Ok(counts);
        }

        let rows: Vec<(OrderStatus, i64)> = Order::find()
            .select_only()
            .column(order::Column::OrderStatus)
            .column_as(Expr::col(order::Column::Id).count(), "count")
            .filter(order::Column::ProductId.is_in(products))
            .group_by(order::Column::OrderStatus)
            .into_tuple()
            .all(&*self.db)
            .await?;

        for (status, count) in rows {
            counts.add(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    /// Applies a fulfillment change requested by `actor`.
    ///
    /// Sellers may touch orders for their own products, customers only their own orders.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        actor: Actor,
        order_id: Uuid,
        change: StatusChange,
    ) -> Result<StatusUpdate, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found.".to_string()))?;

        let authorized = match actor {
            Actor::Customer(customer_id) => existing.customer_id == customer_id,
            Actor::Seller(seller_id) => catalog::find_product(&txn, existing.product_id)
                .await?
                .map(|p| p.seller_id == seller_id)
                .unwrap_or(false),
        };
        if !authorized {
            return Err(ServiceError::Forbidden(
                "You are not authorized to update this order.".to_string(),
            ));
        }

        let next = match change {
            StatusChange::BuyAgain => {
                let clone = create_order(&txn, &NewOrder::from(&existing)).await?;
                outbox::enqueue(
                    &txn,
                    &Event::OrderPlaced {
                        order_id: clone.id,
                        order_number: clone.order_number.clone(),
                        product_id: clone.product_id,
                        customer_id: clone.customer_id,
                    },
                )
                .await?;
                txn.commit().await?;
                info!(source = %existing.id, new_order = %clone.id, "order placed again");
                return Ok(StatusUpdate::Reordered(clone));
            }
            StatusChange::Move(next) => next,
        };

        if !existing.order_status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot change order status from {} to {}",
                existing.order_status, next
            )));
        }

        let mut active: order::ActiveModel = existing.into();
        active.order_status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::OrderStatusChanged {
                order_id: updated.id,
                order_number: updated.order_number.clone(),
                product_id: updated.product_id,
                customer_id: updated.customer_id,
                status: next,
                changed_by_customer: matches!(actor, Actor::Customer(_)),
            },
        )
        .await?;
        txn.commit().await?;

        counter!("marketplace.orders.status_changes", 1);
        info!(order_id = %updated.id, status = %next, "order status updated");
        Ok(StatusUpdate::Updated(updated))
    }

    async fn orders_of_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}

fn product_ids(orders: &[order::Model]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = orders.iter().map(|o| o.product_id).collect();
    ids.sort();
    ids.dedup();
    ids
}
