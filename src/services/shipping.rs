use crate::entities::{address, shipping_info, Address, ShippingInfo};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde::Serialize;
use uuid::Uuid;

/// Contact details and address ids bound into one shipping snapshot
#[derive(Debug, Clone)]
pub struct ShippingDetails {
    pub customer_id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub address_id: Uuid,
    pub optional_address_id: Option<Uuid>,
}

/// A shipping record with both addresses resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfoView {
    #[serde(flatten)]
    pub info: shipping_info::Model,
    pub address: Option<address::Model>,
    pub optional_address: Option<address::Model>,
}

pub async fn create_shipping_info<C: ConnectionTrait>(
    conn: &C,
    details: ShippingDetails,
) -> Result<shipping_info::Model, ServiceError> {
    let now = Utc::now();
    let model = shipping_info::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(details.customer_id),
        full_name: Set(details.full_name),
        phone_number: Set(details.phone_number),
        email: Set(details.email),
        address_id: Set(details.address_id),
        optional_address_id: Set(details.optional_address_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(model)
}

pub async fn delete_shipping_info<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<u64, ServiceError> {
    let result = ShippingInfo::delete_by_id(id).exec(conn).await?;
    Ok(result.rows_affected)
}

/// Loads a shipping record together with its primary and optional addresses.
pub async fn load_shipping_view<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<ShippingInfoView>, ServiceError> {
    let Some(info) = ShippingInfo::find_by_id(id).one(conn).await? else {
        return Ok(None);
    };
    let address = Address::find_by_id(info.address_id).one(conn).await?;
    let optional_address = match info.optional_address_id {
        Some(optional_id) => Address::find_by_id(optional_id).one(conn).await?,
        None => None,
    };
    Ok(Some(ShippingInfoView {
        info,
        address,
        optional_address,
    }))
}
