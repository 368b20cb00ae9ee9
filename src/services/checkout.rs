use crate::{
    config::AppConfig,
    entities::order::{self, PaymentMethod},
    entities::{address, shipping_info},
    errors::ServiceError,
    events::{outbox, Event},
    services::{
        addresses::{self, AddressSnapshot, NewAddress},
        carts,
        orders::{self, NewOrder},
        payment_gateway::{GatewayContact, GatewaySession, GatewaySessionRequest, PaymentGateway},
        shipping::{self, ShippingDetails},
        temp_orders::{self, StagedCheckout},
    },
};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /orders/add-order`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub payment_method: String,
    pub promo_code: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub full_name: String,
    #[serde(default)]
    #[validate(length(max = 40))]
    pub phone_number: String,
    #[serde(default)]
    #[validate(length(max = 320))]
    pub email: String,
    pub address_id: Option<Uuid>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub name: Option<String>,
    #[validate]
    pub checkout_payload: Option<CheckoutPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    #[serde(default)]
    #[validate]
    pub products: Vec<CheckoutLine>,
    pub subtotal: Option<Decimal>,
    pub shipping: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub total: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub product_id: Option<Uuid>,
    pub quantity: Option<i32>,
    pub price: Option<Decimal>,
}

/// A line that passed validation
#[derive(Debug, Clone, Copy, PartialEq)]
struct ValidLine {
    product_id: Uuid,
    quantity: i32,
    price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
enum AddressChoice {
    Existing(Uuid),
    Inline {
        name: String,
        address_line1: String,
        address_line2: Option<String>,
        city: String,
        state: String,
        zip_code: String,
        country: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct ValidatedCheckout {
    method: PaymentMethod,
    lines: Vec<ValidLine>,
    address: AddressChoice,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CheckoutRequest {
    /// Fail-fast checks run before anything is written.
    fn validated(&self) -> Result<ValidatedCheckout, ServiceError> {
        self.validate()?;

        let products = self
            .checkout_payload
            .as_ref()
            .map(|p| p.products.as_slice())
            .unwrap_or_default();
        if products.is_empty() {
            return Err(ServiceError::BadRequest(
                "No products found in checkout payload".to_string(),
            ));
        }

        let address = match self.address_id {
            Some(id) => AddressChoice::Existing(id),
            None => {
                let line1 = non_blank(&self.address_line1);
                let city = non_blank(&self.city);
                let zip = non_blank(&self.zip_code);
                let country = non_blank(&self.country);
                match (line1, city, zip, country) {
                    (Some(address_line1), Some(city), Some(zip_code), Some(country)) => {
                        AddressChoice::Inline {
                            name: non_blank(&self.name).unwrap_or_else(|| "Unnamed".to_string()),
                            address_line1,
                            address_line2: non_blank(&self.address_line2),
                            city,
                            state: non_blank(&self.state).unwrap_or_default(),
                            zip_code,
                            country,
                        }
                    }
                    _ => {
                        return Err(ServiceError::BadRequest(
                            "Missing required address fields".to_string(),
                        ))
                    }
                }
            }
        };

        let mut lines = Vec::with_capacity(products.len());
        for line in products {
            let (Some(product_id), Some(quantity), Some(price)) =
                (line.product_id, line.quantity, line.price)
            else {
                return Err(ServiceError::BadRequest(
                    "Each product needs productId, quantity and price".to_string(),
                ));
            };
            if quantity < 1 {
                return Err(ServiceError::BadRequest(
                    "Quantity must be at least 1".to_string(),
                ));
            }
            if price < Decimal::ZERO {
                return Err(ServiceError::BadRequest(
                    "Price cannot be negative".to_string(),
                ));
            }
            lines.push(ValidLine {
                product_id,
                quantity,
                price,
            });
        }

        let method = PaymentMethod::from_str(self.payment_method.trim())
            .map_err(|_| ServiceError::BadRequest("Invalid payment method".to_string()))?;

        Ok(ValidatedCheckout {
            method,
            lines,
            address,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutAddresses {
    pub primary: address::Model,
    pub optional: Option<address::Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub total_orders: usize,
    pub subtotal: Option<Decimal>,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Option<Decimal>,
}

impl OrderSummary {
    fn echo(payload: &CheckoutPayload, total_orders: usize) -> Self {
        Self {
            total_orders,
            subtotal: payload.subtotal,
            shipping: payload.shipping.unwrap_or_default(),
            tax: payload.tax.unwrap_or_default(),
            total: payload.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodCheckout {
    pub orders: Vec<order::Model>,
    pub shipping_info: shipping_info::Model,
    pub addresses: CheckoutAddresses,
    pub order_summary: OrderSummary,
}

#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Committed cash-on-delivery orders
    Cod(CodCheckout),
    /// Orders staged behind a payment session
    Gateway(GatewaySession),
}

/// Drives address, shipping and order creation for one checkout and hands gateway
/// payments to the payment gateway.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            gateway,
            config,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let checkout = request.validated()?;
        let payload = request.checkout_payload.clone().unwrap_or_default();

        let txn = self.db.begin().await?;

        let (primary, primary_existing, optional) = match &checkout.address {
            AddressChoice::Existing(id) => {
                let found = addresses::find_address(&txn, *id)
                    .await?
                    .filter(|a| a.customer_id == customer_id)
                    .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;
                (found, true, None)
            }
            AddressChoice::Inline {
                name,
                address_line1,
                address_line2,
                city,
                state,
                zip_code,
                country,
            } => {
                let template = NewAddress {
                    customer_id,
                    name: name.clone(),
                    address_line: address_line1.clone(),
                    city: city.clone(),
                    state: state.clone(),
                    zip_code: zip_code.clone(),
                    country: country.clone(),
                };
                let primary = addresses::create_address(&txn, template.clone()).await?;
                let optional = match address_line2 {
                    Some(line2) => Some(
                        addresses::create_address(
                            &txn,
                            NewAddress {
                                address_line: line2.clone(),
                                ..template
                            },
                        )
                        .await?,
                    ),
                    None => None,
                };
                (primary, false, optional)
            }
        };

        let shipping_info = shipping::create_shipping_info(
            &txn,
            ShippingDetails {
                customer_id,
                full_name: request.full_name.clone(),
                phone_number: request.phone_number.clone(),
                email: request.email.clone(),
                address_id: primary.id,
                optional_address_id: optional.as_ref().map(|a| a.id),
            },
        )
        .await?;

        let mut placed = Vec::with_capacity(checkout.lines.len());
        for line in &checkout.lines {
            let order = orders::create_order(
                &txn,
                &NewOrder {
                    customer_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.price,
                    payment_method: checkout.method,
                    shipping_info_id: shipping_info.id,
                },
            )
            .await?;
            outbox::enqueue(
                &txn,
                &Event::OrderPlaced {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    product_id: order.product_id,
                    customer_id,
                },
            )
            .await?;
            placed.push(order);
        }

        match checkout.method {
            PaymentMethod::Cod => {
                let purchased: Vec<Uuid> = checkout.lines.iter().map(|l| l.product_id).collect();
                carts::remove_purchased_products(&txn, customer_id, &purchased).await?;
                txn.commit().await?;

                counter!("marketplace.checkout.cod", 1);
                info!(orders = placed.len(), "cash-on-delivery checkout committed");
                Ok(CheckoutOutcome::Cod(CodCheckout {
                    order_summary: OrderSummary::echo(&payload, placed.len()),
                    orders: placed,
                    shipping_info,
                    addresses: CheckoutAddresses { primary, optional },
                }))
            }
            PaymentMethod::Gateway => {
                let staged = temp_orders::stage(
                    &txn,
                    StagedCheckout {
                        customer_id,
                        order_ids: placed.iter().map(|o| o.id).collect(),
                        shipping_info_id: shipping_info.id,
                        primary_address_id: primary.id,
                        primary_address_existing: primary_existing,
                        optional_address_id: optional.as_ref().map(|a| a.id),
                        checkout_payload: serde_json::to_value(&payload)?,
                        products: serde_json::to_value(&payload.products)?,
                    },
                    self.config.temp_order_ttl(),
                )
                .await?;
                txn.commit().await?;
                counter!("marketplace.checkout.staged", 1);

                // the session is opened only after the staged rows are durable
                let session_request = GatewaySessionRequest::for_checkout(
                    &self.config.payment_gateway,
                    self.config.backend_url(),
                    &staged.token(),
                    payable_total(&payload, &checkout.lines),
                    checkout.lines.len(),
                    GatewayContact {
                        full_name: &request.full_name,
                        email: &request.email,
                        phone_number: &request.phone_number,
                    },
                    &AddressSnapshot::from(&primary),
                    request.address_line2.as_deref(),
                )?;

                let session = self.gateway.init_session(&session_request).await.map_err(|e| {
                    warn!(temp_order_id = %staged.id, error = %e, "payment session failed; orders stay pending");
                    e
                })?;
                info!(temp_order_id = %staged.id, "payment session opened");
                Ok(CheckoutOutcome::Gateway(session))
            }
        }
    }

    /// Opens a fresh payment session for a live staged checkout of `customer_id`.
    #[instrument(skip(self))]
    pub async fn retry_payment(
        &self,
        customer_id: Uuid,
        temp_order_id: Uuid,
    ) -> Result<GatewaySession, ServiceError> {
        let staged = temp_orders::find(&*self.db, temp_order_id)
            .await?
            .filter(|t| t.customer_id == customer_id)
            .ok_or_else(|| ServiceError::NotFound("Pending payment not found".to_string()))?;
        if staged.is_expired(chrono::Utc::now()) {
            return Err(ServiceError::NotFound(
                "Pending payment has expired".to_string(),
            ));
        }

        let payload: CheckoutPayload = serde_json::from_value(staged.checkout_payload.clone())?;
        let shipping = shipping::load_shipping_view(&*self.db, staged.shipping_info_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shipping info not found".to_string()))?;
        let primary = shipping
            .address
            .as_ref()
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;
        let lines: Vec<ValidLine> = payload
            .products
            .iter()
            .filter_map(|l| {
                Some(ValidLine {
                    product_id: l.product_id?,
                    quantity: l.quantity?,
                    price: l.price?,
                })
            })
            .collect();

        let session_request = GatewaySessionRequest::for_checkout(
            &self.config.payment_gateway,
            self.config.backend_url(),
            &staged.token(),
            payable_total(&payload, &lines),
            lines.len(),
            GatewayContact {
                full_name: &shipping.info.full_name,
                email: &shipping.info.email,
                phone_number: &shipping.info.phone_number,
            },
            &AddressSnapshot::from(primary),
            shipping
                .optional_address
                .as_ref()
                .map(|a| a.address_line.as_str()),
        )?;

        counter!("marketplace.checkout.payment_retries", 1);
        self.gateway.init_session(&session_request).await
    }
}

/// The payload total, or the line sum plus shipping and tax when the client omitted it.
fn payable_total(payload: &CheckoutPayload, lines: &[ValidLine]) -> Decimal {
    payload.total.unwrap_or_else(|| {
        let items: Decimal = lines
            .iter()
            .map(|l| l.price * Decimal::from(l.quantity))
            .sum();
        items + payload.shipping.unwrap_or_default() + payload.tax.unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::{customer, Order, TempOrder};
    use crate::services::payment_gateway::GatewaySessionRequest;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
    use serde_json::json;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn init_session(
                &self,
                request: &GatewaySessionRequest,
            ) -> Result<GatewaySession, ServiceError>;
        }
    }

    fn request(body: serde_json::Value) -> CheckoutRequest {
        serde_json::from_value(body).unwrap()
    }

    fn inline_body(method: &str) -> serde_json::Value {
        json!({
            "paymentMethod": method,
            "fullName": "Rahim Uddin",
            "phoneNumber": "01700000000",
            "email": "rahim@example.com",
            "addressLine1": "12 Lake Road",
            "addressLine2": "Flat 3B",
            "city": "Dhaka",
            "zipCode": "1207",
            "country": "Bangladesh",
            "checkoutPayload": {
                "products": [{ "productId": Uuid::new_v4(), "quantity": 2, "price": 100 }],
                "subtotal": 200,
                "total": 200
            }
        })
    }

    #[test]
    fn empty_products_are_rejected() {
        let mut body = inline_body("cod");
        body["checkoutPayload"]["products"] = json!([]);
        assert_matches!(request(body).validated(), Err(ServiceError::BadRequest(_)));
    }

    #[test]
    fn missing_payload_is_rejected() {
        let mut body = inline_body("cod");
        body.as_object_mut().unwrap().remove("checkoutPayload");
        assert_matches!(request(body).validated(), Err(ServiceError::BadRequest(_)));
    }

    #[test]
    fn inline_address_requires_core_fields() {
        let mut body = inline_body("cod");
        body["city"] = json!("  ");
        assert_matches!(
            request(body).validated(),
            Err(ServiceError::BadRequest(msg)) if msg == "Missing required address fields"
        );
    }

    #[test]
    fn address_id_skips_inline_checks() {
        let mut body = inline_body("cod");
        body["addressId"] = json!(Uuid::new_v4());
        body["city"] = json!(null);
        assert!(request(body).validated().is_ok());
    }

    #[test]
    fn inline_defaults_name_and_state() {
        let checkout = request(inline_body("gateway")).validated().unwrap();
        assert_eq!(checkout.method, PaymentMethod::Gateway);
        assert_matches!(
            checkout.address,
            AddressChoice::Inline { ref name, ref state, .. } if name == "Unnamed" && state.is_empty()
        );
    }

    #[test]
    fn line_constraints_are_enforced() {
        for line in [
            json!({ "productId": Uuid::new_v4(), "quantity": 0, "price": 10 }),
            json!({ "productId": Uuid::new_v4(), "quantity": 1, "price": -1 }),
            json!({ "quantity": 1, "price": 10 }),
        ] {
            let mut body = inline_body("cod");
            body["checkoutPayload"]["products"] = json!([line]);
            assert_matches!(request(body).validated(), Err(ServiceError::BadRequest(_)));
        }
    }

    #[test]
    fn unknown_payment_method_is_rejected() {
        assert_matches!(
            request(inline_body("card")).validated(),
            Err(ServiceError::BadRequest(msg)) if msg == "Invalid payment method"
        );
    }

    #[test]
    fn total_falls_back_to_line_sum() {
        let payload = CheckoutPayload {
            shipping: Some(dec!(60)),
            ..Default::default()
        };
        let lines = [ValidLine {
            product_id: Uuid::new_v4(),
            quantity: 3,
            price: dec!(20),
        }];
        assert_eq!(payable_total(&payload, &lines), dec!(120));
    }

    #[tokio::test]
    async fn gateway_failure_keeps_staged_orders() {
        let db = establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let db = Arc::new(db);

        let customer_id = Uuid::new_v4();
        customer::ActiveModel {
            id: Set(customer_id),
            first_name: Set("Rahim".into()),
            last_name: Set("Uddin".into()),
            email: Set("rahim@example.com".into()),
            created_at: Set(Utc::now()),
        }
        .insert(&*db)
        .await
        .unwrap();

        let mut gateway = MockGateway::new();
        gateway
            .expect_init_session()
            .withf(|req| req.tran_id.starts_with("temp_") && req.cus_add2 == "Flat 3B")
            .times(1)
            .returning(|_| {
                Err(ServiceError::GatewayRejected {
                    message: "Store Credential Error".into(),
                    payload: json!({ "status": "FAILED" }),
                })
            });

        let config = AppConfig::new(
            "sqlite::memory:".into(),
            crate::config::tests::SECRET.into(),
            "http://localhost:8080".into(),
            "http://localhost:3000".into(),
            "test".into(),
        );
        let service = CheckoutService::new(db.clone(), Arc::new(gateway), Arc::new(config));

        let err = service
            .place_order(customer_id, request(inline_body("gateway")))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::GatewayRejected { .. });

        assert_eq!(Order::find().count(&*db).await.unwrap(), 1);
        assert_eq!(TempOrder::find().count(&*db).await.unwrap(), 1);
    }
}
