use crate::entities::{address, Address};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde::Serialize;
use uuid::Uuid;

/// Fields of an ad-hoc checkout address
#[derive(Debug, Clone)]
pub struct NewAddress {
    pub customer_id: Uuid,
    pub name: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// The parts of an address the payment gateway needs for its customer and shipping fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl From<&address::Model> for AddressSnapshot {
    fn from(model: &address::Model) -> Self {
        Self {
            address_line: model.address_line.clone(),
            city: model.city.clone(),
            state: model.state.clone(),
            zip_code: model.zip_code.clone(),
            country: model.country.clone(),
        }
    }
}

/// Checkout-created addresses are never the customer's default.
pub async fn create_address<C: ConnectionTrait>(
    conn: &C,
    new: NewAddress,
) -> Result<address::Model, ServiceError> {
    let now = Utc::now();
    let model = address::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(new.customer_id),
        name: Set(new.name),
        address_line: Set(new.address_line),
        city: Set(new.city),
        state: Set(new.state),
        zip_code: Set(new.zip_code),
        country: Set(new.country),
        is_default: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(model)
}

pub async fn find_address<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<address::Model>, ServiceError> {
    Ok(Address::find_by_id(id).one(conn).await?)
}

pub async fn delete_address<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<u64, ServiceError> {
    let result = Address::delete_by_id(id).exec(conn).await?;
    Ok(result.rows_affected)
}
