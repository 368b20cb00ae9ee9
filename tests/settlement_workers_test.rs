//! Background workers: outbox delivery and the staged-checkout sweeper.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{inline_checkout, TestApp};
use marketplace_api::auth::Actor;
use marketplace_api::entities::{
    order::{self, OrderStatus, PaymentStatus},
    outbox_event::{self, OutboxStatus},
    recent_activity, seller_notification, Order, OutboxEvent, RecentActivity, SellerNotification,
    TempOrder,
};
use marketplace_api::events::{outbox, Event, EventSender};
use marketplace_api::services::{notifications::NotificationService, sweeper::SweeperService};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, Set,
};
use tokio::sync::mpsc;
use uuid::Uuid;

async fn stage_gateway_checkout(app: &TestApp, customer_id: Uuid, product_id: Uuid) {
    let token = app.token_for(Actor::Customer(customer_id));
    let response = app
        .checkout(&token, inline_checkout("gateway", &[(product_id, 1, 100)], None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn backdate_orders(app: &TestApp, by: Duration) {
    for existing in Order::find().all(app.db()).await.unwrap() {
        let created = existing.created_at - by;
        let mut active = existing.into_active_model();
        active.created_at = Set(created);
        active.update(app.db()).await.unwrap();
    }
}

fn sweeper(app: &TestApp) -> (SweeperService, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(16);
    let service = SweeperService::new(
        app.state.db.clone(),
        EventSender::new(tx),
        Duration::hours(2),
    );
    (service, rx)
}

#[tokio::test]
async fn outbox_delivery_writes_notifications_and_activity() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Record Player", 5).await;
    let token = app.token_for(Actor::Customer(customer.id));
    let response = app
        .checkout(&token, inline_checkout("cod", &[(product.id, 1, 100)], None))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let placed = Order::find().one(app.db()).await.unwrap().unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let notifications = NotificationService::new(app.state.db.clone());
    let delivered = outbox::drain_once(app.db(), &notifications, &EventSender::new(tx), 50)
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    let notes = SellerNotification::find()
        .filter(seller_notification::Column::SellerId.eq(seller.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].order_id, placed.id);
    assert_eq!(notes[0].notification_type, "order placed");

    let activity = RecentActivity::find()
        .filter(recent_activity::Column::CustomerId.eq(customer.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].activity_type, "order added");
    assert!(activity[0].activity_status.contains(&placed.order_number));

    let row = OutboxEvent::find().one(app.db()).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Delivered);
    assert!(row.processed_at.is_some());

    match rx.try_recv() {
        Ok(Event::OrderPlaced { order_id, .. }) => assert_eq!(order_id, placed.id),
        other => panic!("expected an OrderPlaced event, got {:?}", other),
    }

    // nothing left to deliver
    let again = outbox::drain_once(app.db(), &notifications, &EventSender::new(mpsc::channel(1).0), 50)
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn customer_status_change_notifies_the_seller() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Sofa", 5).await;
    let token = app.token_for(Actor::Customer(customer.id));
    app.checkout(&token, inline_checkout("cod", &[(product.id, 1, 100)], None))
        .await;
    let placed = Order::find().one(app.db()).await.unwrap().unwrap();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/update-status/{}", placed.id),
            Some(serde_json::json!({ "orderStatus": "cancelled" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let notifications = NotificationService::new(app.state.db.clone());
    let delivered = outbox::drain_once(
        app.db(),
        &notifications,
        &EventSender::new(mpsc::channel(8).0),
        50,
    )
    .await
    .unwrap();
    assert_eq!(delivered, 2);

    let types: Vec<String> = SellerNotification::find()
        .all(app.db())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.notification_type)
        .collect();
    assert!(types.contains(&"Order cancelled".to_string()));

    let cancelled_activity = RecentActivity::find()
        .filter(recent_activity::Column::ActivityType.eq("order cancelled"))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(cancelled_activity, 1);
}

#[tokio::test]
async fn failing_events_are_rescheduled_not_lost() {
    let app = TestApp::new().await;
    let now = Utc::now();
    outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set("order".to_string()),
        aggregate_id: Set(None),
        event_type: Set("orderPlaced".to_string()),
        payload: Set(serde_json::json!({ "type": "somethingElse" })),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        error_message: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        processed_at: Set(None),
    }
    .insert(app.db())
    .await
    .unwrap();

    let notifications = NotificationService::new(app.state.db.clone());
    let delivered = outbox::drain_once(
        app.db(),
        &notifications,
        &EventSender::new(mpsc::channel(1).0),
        50,
    )
    .await
    .unwrap();
    assert_eq!(delivered, 0);

    let row = OutboxEvent::find().one(app.db()).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert_eq!(row.attempts, 1);
    assert!(row.available_at > now);
    assert!(row.error_message.is_some());
}

#[tokio::test]
async fn abandoned_processing_rows_are_reclaimed_after_the_lease() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Armchair", 5).await;
    let token = app.token_for(Actor::Customer(customer.id));
    app.checkout(&token, inline_checkout("cod", &[(product.id, 1, 100)], None))
        .await;

    // a worker claimed the row and died before recording the outcome
    let row = OutboxEvent::find().one(app.db()).await.unwrap().unwrap();
    let mut claimed = row.into_active_model();
    claimed.status = Set(OutboxStatus::Processing);
    claimed.attempts = Set(1);
    claimed.updated_at = Set(Utc::now());
    let claimed = claimed.update(app.db()).await.unwrap();

    let notifications = NotificationService::new(app.state.db.clone());
    let sender = EventSender::new(mpsc::channel(8).0);
    let while_leased = outbox::drain_once(app.db(), &notifications, &sender, 50)
        .await
        .unwrap();
    assert_eq!(while_leased, 0);

    let mut stale = claimed.into_active_model();
    stale.updated_at = Set(Utc::now() - Duration::seconds(outbox::PROCESSING_LEASE_SECS + 60));
    stale.update(app.db()).await.unwrap();

    let reclaimed = outbox::drain_once(app.db(), &notifications, &sender, 50)
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    let row = OutboxEvent::find().one(app.db()).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Delivered);
    assert_eq!(row.attempts, 2);
    assert_eq!(
        SellerNotification::find()
            .filter(seller_notification::Column::SellerId.eq(seller.id))
            .count(app.db())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn one_bad_row_does_not_stop_the_batch() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Ottoman", 5).await;
    let token = app.token_for(Actor::Customer(customer.id));

    let earlier = Utc::now() - Duration::minutes(5);
    outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set("order".to_string()),
        aggregate_id: Set(None),
        event_type: Set("orderPlaced".to_string()),
        payload: Set(serde_json::json!({ "type": "unknown" })),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(earlier),
        error_message: Set(None),
        created_at: Set(earlier),
        updated_at: Set(earlier),
        processed_at: Set(None),
    }
    .insert(app.db())
    .await
    .unwrap();
    app.checkout(&token, inline_checkout("cod", &[(product.id, 1, 100)], None))
        .await;

    let notifications = NotificationService::new(app.state.db.clone());
    let delivered = outbox::drain_once(
        app.db(),
        &notifications,
        &EventSender::new(mpsc::channel(8).0),
        50,
    )
    .await
    .unwrap();
    assert_eq!(delivered, 1);

    let delivered_rows = OutboxEvent::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Delivered))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(delivered_rows, 1);
}

#[tokio::test]
async fn sweeper_expires_staged_checkouts() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Bookshelf", 5).await;
    stage_gateway_checkout(&app, customer.id, product.id).await;
    let staged = TempOrder::find().one(app.db()).await.unwrap().unwrap();
    let (sweeper, mut events) = sweeper(&app);

    // still live
    let (reaped, _) = sweeper.expire_staged(Utc::now()).await.unwrap();
    assert_eq!(reaped, 0);

    let after_ttl = staged.expires_at + Duration::seconds(1);
    let (reaped, failed) = sweeper.expire_staged(after_ttl).await.unwrap();
    assert_eq!((reaped, failed), (1, 1));

    assert_eq!(TempOrder::find().count(app.db()).await.unwrap(), 0);
    let expired = Order::find().one(app.db()).await.unwrap().unwrap();
    assert_eq!(expired.payment_status, PaymentStatus::Failed);
    assert_eq!(expired.order_status, OrderStatus::Cancelled);

    assert_eq!(
        events.try_recv().unwrap(),
        Event::StagedCheckoutExpired {
            temp_order_id: staged.id,
            orders: 1
        }
    );

    // a late success callback now finds nothing to settle
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payment/success?tran_id={}", staged.token()),
            None,
            None,
        )
        .await;
    assert!(common::location(&response).contains("/payment/fail"));
    let still = Order::find().one(app.db()).await.unwrap().unwrap();
    assert_eq!(still.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn sweeper_cancels_orphaned_gateway_orders_only() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let seller = app.seed_seller().await;
    let product = app.seed_product(seller.id, "Lamp", 10).await;

    // an orphan: its staging row is gone
    stage_gateway_checkout(&app, customer.id, product.id).await;
    let orphan = Order::find().one(app.db()).await.unwrap().unwrap();
    TempOrder::delete_many().exec(app.db()).await.unwrap();

    // a cash order that is old but never involved a gateway
    let token = app.token_for(Actor::Customer(customer.id));
    app.checkout(&token, inline_checkout("cod", &[(product.id, 1, 100)], None))
        .await;

    // an old order whose staging row is still live
    stage_gateway_checkout(&app, customer.id, product.id).await;
    let live_staged = TempOrder::find().one(app.db()).await.unwrap().unwrap();
    let live_order_id = live_staged.order_refs()[0];

    backdate_orders(&app, Duration::hours(3)).await;

    let (sweeper, _events) = sweeper(&app);
    let report = sweeper.run_once(Utc::now()).await.unwrap();

    assert_eq!(report.expired_checkouts, 0);
    assert_eq!(report.orphans_cancelled, 1);

    let reloaded = Order::find_by_id(orphan.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(reloaded.payment_status, PaymentStatus::Failed);
    assert_eq!(reloaded.order_status, OrderStatus::Cancelled);

    let cod_pending = Order::find()
        .filter(order::Column::PaymentMethod.eq(order::PaymentMethod::Cod))
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(cod_pending, 1);

    let live = Order::find_by_id(live_order_id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(live.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn sweeper_worker_can_be_started_and_aborted() {
    let app = TestApp::new().await;
    let (sweeper, _events) = sweeper(&app);
    let handle = sweeper.start(std::time::Duration::from_millis(10));
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
}
