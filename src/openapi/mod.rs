use axum::{routing::get, Json, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace API",
        version = "1.0.0",
        description = r#"
# Marketplace order and payment API

Checkout for customers and order management for sellers.

## Checkout

`POST /api/v1/orders/add-order` creates one order per product line.

- `cod`: orders are committed and the response is `201`
- `gateway`: orders are staged, a hosted payment session is opened and its `paymentUrl` returned

The payment gateway redirects the buyer to `/api/v1/payment/{success|fail|cancel}`, which settle
or roll back the staged checkout and redirect to the storefront.

## Authentication

Order endpoints require a bearer token naming a customer or a seller:

```
Authorization: Bearer <your-jwt-token>
```

## Errors

```json
{
  "error": "Bad Request",
  "message": "No products found in checkout payload",
  "request_id": "5b0e...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "checkout", description = "Order placement"),
        (name = "orders", description = "Customer and seller order views"),
        (name = "payment", description = "Payment gateway callbacks"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::checkout::add_order,
        crate::handlers::orders::list_customer_orders,
        crate::handlers::orders::list_seller_orders,
        crate::handlers::orders::get_seller_order,
        crate::handlers::orders::list_customer_payments,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::order_status_counts,
        crate::handlers::orders::retry_payment,
        crate::handlers::payments::payment_success,
        crate::handlers::payments::payment_fail,
        crate::handlers::payments::payment_cancel,
        crate::handlers::payments::payment_ipn,
        crate::health::health_check,
    ),
    components(
        schemas(
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutPayload,
            crate::services::checkout::CheckoutLine,
            crate::services::checkout::OrderSummary,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::StatusCounts,
            crate::services::payment_gateway::GatewaySession,
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::PaymentMethod,
            crate::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
