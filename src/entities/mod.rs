pub mod address;
pub mod cart;
pub mod customer;
pub mod order;
pub mod outbox_event;
pub mod product;
pub mod recent_activity;
pub mod seller;
pub mod seller_notification;
pub mod shipping_info;
pub mod temp_order;

pub use address::Entity as Address;
pub use cart::Entity as Cart;
pub use customer::Entity as Customer;
pub use order::Entity as Order;
pub use outbox_event::Entity as OutboxEvent;
pub use product::Entity as Product;
pub use recent_activity::Entity as RecentActivity;
pub use seller::Entity as Seller;
pub use seller_notification::Entity as SellerNotification;
pub use shipping_info::Entity as ShippingInfo;
pub use temp_order::Entity as TempOrder;

/// Reads a JSON array of UUID strings, skipping malformed entries.
pub(crate) fn uuid_list(value: &serde_json::Value) -> Vec<uuid::Uuid> {
    value
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| uuid::Uuid::parse_str(s).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Encodes ids as a JSON array of strings.
pub(crate) fn uuid_json(ids: &[uuid::Uuid]) -> serde_json::Value {
    serde_json::Value::Array(
        ids.iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect(),
    )
}
