use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    /// `temp_<id>` token handed to the gateway
    pub tran_id: Option<String>,
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/success", get(payment_success).post(payment_success))
        .route("/fail", get(payment_fail).post(payment_fail))
        .route("/cancel", get(payment_cancel).post(payment_cancel))
        .route("/ipn", post(payment_ipn))
}

/// Gateway success redirect
#[utoipa::path(
    get,
    path = "/api/v1/payment/success",
    params(CallbackQuery),
    responses((status = 303, description = "Redirect to the storefront result page")),
    tag = "payment"
)]
pub async fn payment_success(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let target = state
        .services
        .payments
        .settle_success(query.tran_id.as_deref())
        .await;
    Redirect::to(&target)
}

/// Gateway failure redirect
#[utoipa::path(
    get,
    path = "/api/v1/payment/fail",
    params(CallbackQuery),
    responses((status = 303, description = "Redirect to the storefront failure page")),
    tag = "payment"
)]
pub async fn payment_fail(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let target = state
        .services
        .payments
        .compensate(query.tran_id.as_deref())
        .await;
    Redirect::to(&target)
}

/// Buyer cancelled on the hosted page
#[utoipa::path(
    get,
    path = "/api/v1/payment/cancel",
    params(CallbackQuery),
    responses((status = 303, description = "Redirect to the storefront failure page")),
    tag = "payment"
)]
pub async fn payment_cancel(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    info!(tran_id = ?query.tran_id, "payment cancelled by buyer");
    let target = state
        .services
        .payments
        .compensate(query.tran_id.as_deref())
        .await;
    Redirect::to(&target)
}

/// Instant payment notification; acknowledged only
#[utoipa::path(
    post,
    path = "/api/v1/payment/ipn",
    responses((status = 200, description = "Acknowledged", body = String)),
    tag = "payment"
)]
pub async fn payment_ipn() -> &'static str {
    info!("payment IPN received");
    "OK"
}
