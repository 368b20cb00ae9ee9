use axum::{extract::State, response::Response, Json};

use crate::auth::CustomerActor;
use crate::errors::ApiError;
use crate::handlers::common::{created_response, success_response, validate_input};
use crate::services::checkout::{CheckoutOutcome, CheckoutRequest, CodCheckout};
use crate::services::payment_gateway::GatewaySession;
use crate::{ApiResponse, AppState};

/// Place the orders of one checkout
#[utoipa::path(
    post,
    path = "/api/v1/orders/add-order",
    summary = "Checkout",
    description = "Create one order per product line. Cash-on-delivery orders are committed immediately; gateway orders are staged and a hosted payment session is opened.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Cash-on-delivery orders created", body = ApiResponse<CodCheckout>),
        (status = 200, description = "Payment session created", body = ApiResponse<GatewaySession>),
        (status = 400, description = "Invalid checkout or gateway rejection", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn add_order(
    State(state): State<AppState>,
    CustomerActor(customer_id): CustomerActor,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;

    match state
        .services
        .checkout
        .place_order(customer_id, request)
        .await?
    {
        CheckoutOutcome::Cod(placed) => Ok(created_response(ApiResponse::with_message(
            placed,
            "Orders created successfully",
        ))),
        CheckoutOutcome::Gateway(session) => Ok(success_response(ApiResponse::with_message(
            session,
            "Payment session created",
        ))),
    }
}
