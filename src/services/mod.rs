pub mod addresses;
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod notifications;
pub mod order_ids;
pub mod orders;
pub mod payment_callbacks;
pub mod payment_gateway;
pub mod shipping;
pub mod sweeper;
pub mod temp_orders;
