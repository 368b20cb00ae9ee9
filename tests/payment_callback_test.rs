//! Integration tests for the gateway callbacks under `/api/v1/payment`.

mod common;

use axum::http::{Method, StatusCode};
use common::{inline_checkout, location, saved_address_checkout, TestApp, FRONTEND_URL};
use marketplace_api::auth::Actor;
use marketplace_api::entities::{
    order::PaymentStatus, outbox_event, Address, Cart, Order, OutboxEvent, ShippingInfo, TempOrder,
};
use rstest::rstest;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

/// Runs a gateway checkout and returns the staged `temp_<id>` token.
async fn stage_checkout(app: &TestApp, body: serde_json::Value, customer_id: uuid::Uuid) -> String {
    let token = app.token_for(Actor::Customer(customer_id));
    let response = app.checkout(&token, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let staged = TempOrder::find().one(app.db()).await.unwrap().unwrap();
    staged.token()
}

#[tokio::test]
async fn success_settles_orders_and_cleans_carts() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let first = app.seed_product(seller.id, "Espresso Machine", 2).await;
    let second = app.seed_product(seller.id, "Grinder", 2).await;
    let unrelated = app.seed_product(seller.id, "Kettle", 2).await;
    app.seed_cart(customer.id, &[first.id, unrelated.id]).await;
    let tran_id = stage_checkout(
        &app,
        inline_checkout("gateway", &[(first.id, 1, 100), (second.id, 1, 100)], None),
        customer.id,
    )
    .await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payment/success?tran_id={}", tran_id),
            None,
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/payment/success?tran_id={}", FRONTEND_URL, tran_id)
    );

    let orders = Order::find().all(app.db()).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.payment_status == PaymentStatus::Paid));
    assert_eq!(TempOrder::find().count(app.db()).await.unwrap(), 0);

    let carts = Cart::find().all(app.db()).await.unwrap();
    assert_eq!(carts.len(), 1);
    assert_eq!(carts[0].product_refs(), vec![unrelated.id]);

    let receipts = OutboxEvent::find()
        .filter(outbox_event::Column::EventType.eq("paymentReceived"))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(receipts, 2);
}

#[tokio::test]
async fn success_accepts_post_from_the_gateway() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Blender", 2).await;
    let tran_id = stage_checkout(
        &app,
        inline_checkout("gateway", &[(product.id, 1, 100)], None),
        customer.id,
    )
    .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/payment/success?tran_id={}", tran_id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).contains("/payment/success"));
}

#[tokio::test]
async fn replayed_success_redirects_to_fail_and_changes_nothing() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Toaster", 2).await;
    let tran_id = stage_checkout(
        &app,
        inline_checkout("gateway", &[(product.id, 1, 100)], None),
        customer.id,
    )
    .await;
    let uri = format!("/api/v1/payment/success?tran_id={}", tran_id);

    let first = app.request(Method::GET, &uri, None, None).await;
    assert!(location(&first).contains("/payment/success"));
    let before = Order::find().one(app.db()).await.unwrap().unwrap();

    let replay = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(replay.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&replay),
        format!("{}/payment/fail?tran_id={}", FRONTEND_URL, tran_id)
    );

    let after = Order::find().one(app.db()).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[rstest]
#[case("/api/v1/payment/success", "invalid")]
#[case("/api/v1/payment/success?tran_id=ORD-123", "invalid")]
#[case("/api/v1/payment/fail", "unknown")]
#[case("/api/v1/payment/cancel?tran_id=abc", "abc")]
#[tokio::test]
async fn unusable_tokens_redirect_to_fail(#[case] uri: &str, #[case] echoed: &str) {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, uri, None, None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/payment/fail?tran_id={}", FRONTEND_URL, echoed)
    );
}

#[rstest]
#[case("fail")]
#[case("cancel")]
#[tokio::test]
async fn fail_and_cancel_roll_back_staged_checkout(#[case] kind: &str) {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Air Fryer", 2).await;
    let tran_id = stage_checkout(
        &app,
        inline_checkout("gateway", &[(product.id, 2, 100)], Some("Apartment 9")),
        customer.id,
    )
    .await;
    assert_eq!(Address::find().count(app.db()).await.unwrap(), 2);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payment/{}?tran_id={}", kind, tran_id),
            None,
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/payment/fail?tran_id={}", FRONTEND_URL, tran_id)
    );
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(ShippingInfo::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(Address::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(TempOrder::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn rollback_keeps_a_saved_address() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Rice Cooker", 2).await;
    let saved = app.seed_address(customer.id).await;
    let tran_id = stage_checkout(
        &app,
        saved_address_checkout("gateway", saved.id, &[(product.id, 1, 100)]),
        customer.id,
    )
    .await;

    app.request(
        Method::GET,
        &format!("/api/v1/payment/fail?tran_id={}", tran_id),
        None,
        None,
    )
    .await;

    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
    let remaining = Address::find().all(app.db()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, saved.id);
}

#[tokio::test]
async fn fail_after_success_leaves_paid_orders_alone() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Vacuum", 2).await;
    let tran_id = stage_checkout(
        &app,
        inline_checkout("gateway", &[(product.id, 1, 100)], None),
        customer.id,
    )
    .await;

    app.request(
        Method::GET,
        &format!("/api/v1/payment/success?tran_id={}", tran_id),
        None,
        None,
    )
    .await;
    app.request(
        Method::GET,
        &format!("/api/v1/payment/fail?tran_id={}", tran_id),
        None,
        None,
    )
    .await;

    let orders = Order::find().all(app.db()).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn rollback_racing_a_settled_checkout_keeps_paid_orders() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Turntable", 2).await;
    let tran_id = stage_checkout(
        &app,
        inline_checkout("gateway", &[(product.id, 1, 100)], Some("Flat 9")),
        customer.id,
    )
    .await;

    // the fail callback read the staging row just before success settled it
    let snapshot = TempOrder::find().one(app.db()).await.unwrap().unwrap();
    let payments = app.state.services.payments.clone();
    let redirect = payments.settle_success(Some(&tran_id)).await;
    assert!(redirect.contains("/payment/success"));

    let outcome = payments.rollback(&snapshot).await.unwrap();
    assert_eq!(outcome, None);

    let orders = Order::find().all(app.db()).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_status, PaymentStatus::Paid);
    assert_eq!(ShippingInfo::find().count(app.db()).await.unwrap(), 1);
    assert_eq!(Address::find().count(app.db()).await.unwrap(), 2);
}

#[tokio::test]
async fn rollback_of_a_live_checkout_reports_removed_orders() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let first = app.seed_product(seller.id, "Amplifier", 2).await;
    let second = app.seed_product(seller.id, "Speaker", 2).await;
    stage_checkout(
        &app,
        inline_checkout("gateway", &[(first.id, 1, 100), (second.id, 2, 100)], None),
        customer.id,
    )
    .await;

    let staged = TempOrder::find().one(app.db()).await.unwrap().unwrap();
    let payments = app.state.services.payments.clone();
    assert_eq!(payments.rollback(&staged).await.unwrap(), Some(2));
    // a second attempt with the same snapshot finds nothing to undo
    assert_eq!(payments.rollback(&staged).await.unwrap(), None);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn ipn_is_acknowledged() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/payment/ipn", None, None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"OK");
}
