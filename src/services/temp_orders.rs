//! Staging records for gateway payment attempts.

use crate::entities::temp_order::{self, TOKEN_PREFIX};
use crate::entities::{uuid_json, TempOrder};
use crate::errors::ServiceError;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StagedCheckout {
    pub customer_id: Uuid,
    pub order_ids: Vec<Uuid>,
    pub shipping_info_id: Uuid,
    pub primary_address_id: Uuid,
    pub primary_address_existing: bool,
    pub optional_address_id: Option<Uuid>,
    pub checkout_payload: Value,
    pub products: Value,
}

pub async fn stage<C: ConnectionTrait>(
    conn: &C,
    staged: StagedCheckout,
    ttl: Duration,
) -> Result<temp_order::Model, ServiceError> {
    let now = Utc::now();
    let model = temp_order::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(staged.customer_id),
        order_ids: Set(uuid_json(&staged.order_ids)),
        shipping_info_id: Set(staged.shipping_info_id),
        primary_address_id: Set(staged.primary_address_id),
        primary_address_existing: Set(staged.primary_address_existing),
        optional_address_id: Set(staged.optional_address_id),
        checkout_payload: Set(staged.checkout_payload),
        products: Set(staged.products),
        expires_at: Set(now + ttl),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Extracts the staging id from a `temp_<uuid>` gateway token.
pub fn parse_token(token: &str) -> Option<Uuid> {
    token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

pub fn is_token(token: &str) -> bool {
    token.starts_with(TOKEN_PREFIX)
}

pub async fn find<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<temp_order::Model>, ServiceError> {
    Ok(TempOrder::find_by_id(id).one(conn).await?)
}

/// Deletes the staging row; zero rows affected means someone else settled it first.
pub async fn delete<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<u64, ServiceError> {
    Ok(TempOrder::delete_by_id(id).exec(conn).await?.rows_affected)
}

pub async fn expired<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
) -> Result<Vec<temp_order::Model>, ServiceError> {
    Ok(TempOrder::find()
        .filter(temp_order::Column::ExpiresAt.lte(now))
        .all(conn)
        .await?)
}

/// Order ids still held by unexpired staging rows.
pub async fn live_order_ids<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
) -> Result<HashSet<Uuid>, ServiceError> {
    let live = TempOrder::find()
        .filter(temp_order::Column::ExpiresAt.gt(now))
        .all(conn)
        .await?;
    Ok(live.iter().flat_map(|t| t.order_refs()).collect())
}
