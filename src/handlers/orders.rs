use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthenticatedActor, CustomerActor, SellerActor};
use crate::errors::{ApiError, ServiceError};
use crate::handlers::common::{success_response, validate_input, CountedList};
use crate::services::orders::{
    CustomerOrderView, SellerOrderSummary, StatusChange, StatusCounts, StatusUpdate,
    UpdateOrderStatusRequest,
};
use crate::services::payment_gateway::GatewaySession;
use crate::{ApiResponse, AppState};

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/add-order", post(crate::handlers::checkout::add_order))
        .route("/get-all", get(list_customer_orders))
        .route("/get-seller-orders", get(list_seller_orders))
        .route("/get-seller-order/:id", get(get_seller_order))
        .route("/get-payments", get(list_customer_payments))
        .route("/update-status/:order_id", patch(update_order_status))
        .route("/get-order-status-counts", get(order_status_counts))
        .route("/retry-payment/:temp_order_id", post(retry_payment))
}

/// The customer's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/get-all",
    responses(
        (status = 200, description = "Orders of the authenticated customer", body = [CustomerOrderView]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_customer_orders(
    State(state): State<AppState>,
    CustomerActor(customer_id): CustomerActor,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.customer_orders(customer_id).await?;
    Ok(success_response(CountedList::orders(orders)))
}

/// Orders placed for the seller's products
#[utoipa::path(
    get,
    path = "/api/v1/orders/get-seller-orders",
    responses(
        (status = 200, description = "Orders of the seller's products", body = [SellerOrderSummary]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a seller", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_seller_orders(
    State(state): State<AppState>,
    SellerActor(seller_id): SellerActor,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.seller_orders(seller_id).await?;
    Ok(success_response(CountedList::data(orders)))
}

/// One order of the seller's, by UUID or order number
#[utoipa::path(
    get,
    path = "/api/v1/orders/get-seller-order/{id}",
    params(("id" = String, Path, description = "Order UUID or ORD- number")),
    responses(
        (status = 200, description = "Order detail with product and shipping info"),
        (status = 404, description = "Order not found or unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_seller_order(
    State(state): State<AppState>,
    SellerActor(seller_id): SellerActor,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.seller_order(seller_id, &id).await?;
    Ok(success_response(ApiResponse::success(order)))
}

/// Payment history of the customer
#[utoipa::path(
    get,
    path = "/api/v1/orders/get-payments",
    responses(
        (status = 200, description = "Orders with product titles"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_customer_payments(
    State(state): State<AppState>,
    CustomerActor(customer_id): CustomerActor,
) -> Result<Response, ServiceError> {
    let payments = state.services.orders.customer_payments(customer_id).await?;
    Ok(success_response(json!({
        "success": true,
        "payments": payments,
    })))
}

/// Move an order along the fulfillment axis, or place it again
#[utoipa::path(
    patch,
    path = "/api/v1/orders/update-status/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated"),
        (status = 201, description = "New order created for buy again"),
        (status = 400, description = "Unknown status or illegal transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the order's customer or seller", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let change: StatusChange = request.order_status.parse()?;

    let response = match state
        .services
        .orders
        .update_status(actor, order_id, change)
        .await?
    {
        StatusUpdate::Reordered(new_order) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "New order created successfully for Buy Again.",
                "newOrder": new_order,
            })),
        ),
        StatusUpdate::Updated(order) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Order status updated successfully.",
                "order": order,
            })),
        ),
    };
    Ok(response.into_response())
}

/// Per-status counts over the seller's products
#[utoipa::path(
    get,
    path = "/api/v1/orders/get-order-status-counts",
    responses(
        (status = 200, description = "Counts by fulfillment status", body = ApiResponse<StatusCounts>),
        (status = 403, description = "Not a seller", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn order_status_counts(
    State(state): State<AppState>,
    SellerActor(seller_id): SellerActor,
) -> Result<Json<ApiResponse<StatusCounts>>, ServiceError> {
    let counts = state.services.orders.status_counts(seller_id).await?;
    Ok(Json(ApiResponse::success(counts)))
}

/// Open a new payment session for a staged checkout
#[utoipa::path(
    post,
    path = "/api/v1/orders/retry-payment/{temp_order_id}",
    params(("temp_order_id" = Uuid, Path, description = "Staged checkout id")),
    responses(
        (status = 200, description = "Payment session created", body = ApiResponse<GatewaySession>),
        (status = 400, description = "Gateway rejected the session", body = crate::errors::ErrorResponse),
        (status = 404, description = "No live staged checkout", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    CustomerActor(customer_id): CustomerActor,
    Path(temp_order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<GatewaySession>>, ServiceError> {
    let session = state
        .services
        .checkout
        .retry_payment(customer_id, temp_order_id)
        .await?;
    Ok(Json(ApiResponse::with_message(
        session,
        "Payment session created",
    )))
}
