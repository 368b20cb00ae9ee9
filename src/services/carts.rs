use crate::entities::{cart, uuid_json, Cart};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CartCleanup {
    pub carts_updated: usize,
    pub carts_deleted: usize,
}

/// Drops purchased products from every cart of the customer; carts left empty are deleted.
pub async fn remove_purchased_products<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    purchased: &[Uuid],
) -> Result<CartCleanup, ServiceError> {
    let mut outcome = CartCleanup::default();
    let carts = Cart::find()
        .filter(cart::Column::CustomerId.eq(customer_id))
        .all(conn)
        .await?;

    for existing in carts {
        let current = existing.product_refs();
        let remaining: Vec<Uuid> = current
            .iter()
            .copied()
            .filter(|id| !purchased.contains(id))
            .collect();

        if remaining.is_empty() {
            Cart::delete_by_id(existing.id).exec(conn).await?;
            outcome.carts_deleted += 1;
        } else if remaining.len() != current.len() {
            let mut active: cart::ActiveModel = existing.into();
            active.product_ids = Set(uuid_json(&remaining));
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
            outcome.carts_updated += 1;
        }
    }

    debug!(
        %customer_id,
        updated = outcome.carts_updated,
        deleted = outcome.carts_deleted,
        "cleaned up carts after purchase"
    );
    Ok(outcome)
}
