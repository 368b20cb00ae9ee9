#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use marketplace_api::{
    auth::Actor,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{address, cart, customer, product, seller},
    errors::ServiceError,
    events::{self, EventSender},
    services::payment_gateway::{GatewaySession, GatewaySessionRequest, PaymentGateway},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str =
    "integration-tests-only-secret-integration-tests-only-secret-0123456789";
pub const BACKEND_URL: &str = "http://api.test";
pub const FRONTEND_URL: &str = "http://shop.test";

/// Gateway double that records every session request.
#[derive(Default)]
pub struct StubGateway {
    requests: Mutex<Vec<GatewaySessionRequest>>,
    reject_with: Mutex<Option<Value>>,
}

impl StubGateway {
    pub fn requests(&self) -> Vec<GatewaySessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reject_next(&self, payload: Value) {
        *self.reject_with.lock().unwrap() = Some(payload);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn init_session(
        &self,
        request: &GatewaySessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(payload) = self.reject_with.lock().unwrap().take() {
            return Err(ServiceError::GatewayRejected {
                message: "Store Credential Error".to_string(),
                payload,
            });
        }
        Ok(GatewaySession {
            payment_url: format!("https://gateway.test/pay/{}", request.tran_id),
            sessionkey: Some("SESSION-KEY".to_string()),
        })
    }
}

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            BACKEND_URL.to_string(),
            FRONTEND_URL.to_string(),
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let gateway = Arc::new(StubGateway::default());

        let state = AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            EventSender::new(event_tx),
            gateway.clone(),
        );
        let router = marketplace_api::app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn token_for(&self, actor: Actor) -> String {
        self.state
            .services
            .auth
            .issue_token(actor)
            .expect("token issuance")
    }

    pub async fn seed_customer(&self) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(FirstName().fake()),
            last_name: Set(LastName().fake()),
            email: Set(SafeEmail().fake()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed customer")
    }

    pub async fn seed_seller(&self) -> seller::Model {
        seller::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(CompanyName().fake()),
            email: Set(SafeEmail().fake()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed seller")
    }

    pub async fn seed_product(&self, seller_id: Uuid, title: &str, quantity: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(seller_id),
            title: Set(title.to_string()),
            price: Set(Decimal::from(100)),
            sale_price: Set(None),
            category: Set("Electronics".to_string()),
            brand: Set(Some("Acme".to_string())),
            model: Set(None),
            condition: Set(Some("new".to_string())),
            sku: Set(format!("SKU-{}", Uuid::new_v4().simple())),
            quantity: Set(quantity),
            negotiable: Set(false),
            image_url: Set(Some("https://img.test/1.png".to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_address(&self, customer_id: Uuid) -> address::Model {
        let now = Utc::now();
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            name: Set("Home".to_string()),
            address_line: Set("12 Lake Road".to_string()),
            city: Set("Dhaka".to_string()),
            state: Set("Dhaka Division".to_string()),
            zip_code: Set("1207".to_string()),
            country: Set("Bangladesh".to_string()),
            is_default: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed address")
    }

    pub async fn seed_cart(&self, customer_id: Uuid, products: &[Uuid]) -> cart::Model {
        let now = Utc::now();
        let ids: Vec<String> = products.iter().map(Uuid::to_string).collect();
        cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            title: Set(Some("Wishlist".to_string())),
            product_ids: Set(json!(ids)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed cart")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }

    pub async fn checkout(&self, token: &str, body: Value) -> Response {
        self.request(Method::POST, "/api/v1/orders/add-order", Some(body), Some(token))
            .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// A checkout body with an inline address and one line per `(product, quantity, price)`.
pub fn inline_checkout(method: &str, lines: &[(Uuid, i32, i64)], line2: Option<&str>) -> Value {
    let products: Vec<Value> = lines
        .iter()
        .map(|(id, qty, price)| json!({ "productId": id, "quantity": qty, "price": price }))
        .collect();
    let subtotal: i64 = lines.iter().map(|(_, q, p)| *q as i64 * p).sum();
    json!({
        "paymentMethod": method,
        "fullName": "Rahim Uddin",
        "phoneNumber": "01700000000",
        "email": "rahim@example.com",
        "addressLine1": "House 7, Road 3",
        "addressLine2": line2,
        "city": "Dhaka",
        "zipCode": "1209",
        "country": "Bangladesh",
        "checkoutPayload": {
            "products": products,
            "subtotal": subtotal,
            "total": subtotal
        }
    })
}

/// A checkout body that ships to an existing address.
pub fn saved_address_checkout(method: &str, address_id: Uuid, lines: &[(Uuid, i32, i64)]) -> Value {
    let mut body = inline_checkout(method, lines, None);
    let obj = body.as_object_mut().expect("object body");
    for key in ["addressLine1", "addressLine2", "city", "zipCode", "country"] {
        obj.remove(key);
    }
    obj.insert("addressId".to_string(), json!(address_id));
    body
}

/// Reads a decimal that may be serialized as a string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}
