use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of the synthetic transaction token handed to the payment gateway.
pub const TOKEN_PREFIX: &str = "temp_";

/// Staging record for one gateway payment attempt.
///
/// While a row exists the payment outcome of the orders it references is unsettled.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "temp_orders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    /// JSON array of order id strings.
    #[sea_orm(column_type = "Json")]
    pub order_ids: Json,
    pub shipping_info_id: Uuid,
    pub primary_address_id: Uuid,
    /// True when the primary address was selected from the saved list rather than created.
    pub primary_address_existing: bool,
    #[sea_orm(nullable)]
    pub optional_address_id: Option<Uuid>,
    #[sea_orm(column_type = "Json")]
    pub checkout_payload: Json,
    #[sea_orm(column_type = "Json")]
    pub products: Json,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn token(&self) -> String {
        format!("{}{}", TOKEN_PREFIX, self.id)
    }

    pub fn order_refs(&self) -> Vec<Uuid> {
        super::uuid_list(&self.order_ids)
    }

    /// Product ids of the staged request lines.
    pub fn product_refs(&self) -> Vec<Uuid> {
        self.products
            .as_array()
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| line.get("productId").and_then(|v| v.as_str()))
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn staged(expires_at: DateTime<Utc>) -> Model {
        let order = Uuid::new_v4();
        let product = Uuid::new_v4();
        Model {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            order_ids: json!([order.to_string(), "not-a-uuid"]),
            shipping_info_id: Uuid::new_v4(),
            primary_address_id: Uuid::new_v4(),
            primary_address_existing: false,
            optional_address_id: None,
            checkout_payload: json!({}),
            products: json!([{ "productId": product.to_string(), "quantity": 1, "price": "10" }]),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_carries_prefix_and_id() {
        let model = staged(Utc::now());
        assert_eq!(model.token(), format!("temp_{}", model.id));
    }

    #[test]
    fn malformed_references_are_skipped() {
        let model = staged(Utc::now());
        assert_eq!(model.order_refs().len(), 1);
        assert_eq!(model.product_refs().len(), 1);
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(staged(now).is_expired(now));
        assert!(!staged(now + Duration::seconds(5)).is_expired(now));
    }
}
