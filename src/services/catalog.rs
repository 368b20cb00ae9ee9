//! Read-only product lookups used by checkout, notifications and seller queries.

use crate::entities::{product, Product};
use crate::errors::ServiceError;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use std::collections::HashMap;
use uuid::Uuid;

pub async fn find_product<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<product::Model>, ServiceError> {
    Ok(Product::find_by_id(id).one(conn).await?)
}

/// Titles keyed by product id; unknown ids are simply absent.
pub async fn product_titles<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, String>, ServiceError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, String)> = Product::find()
        .select_only()
        .column(product::Column::Id)
        .column(product::Column::Title)
        .filter(product::Column::Id.is_in(ids.iter().copied()))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(rows.into_iter().collect())
}

pub async fn seller_product_ids<C: ConnectionTrait>(
    conn: &C,
    seller_id: Uuid,
) -> Result<Vec<Uuid>, ServiceError> {
    Ok(Product::find()
        .select_only()
        .column(product::Column::Id)
        .filter(product::Column::SellerId.eq(seller_id))
        .into_tuple()
        .all(conn)
        .await?)
}
