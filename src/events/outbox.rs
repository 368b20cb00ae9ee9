use crate::entities::outbox_event::{self, OutboxStatus};
use crate::entities::OutboxEvent;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::notifications::NotificationService;
use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2;
const BATCH_SIZE: u64 = 50;
/// Seconds a claimed row may stay in `processing` before another drain takes it over
pub const PROCESSING_LEASE_SECS: i64 = 300;

/// Writes `event` to the outbox. Call it with the transaction that performs the related write.
pub async fn enqueue<C: ConnectionTrait>(db: &C, event: &Event) -> Result<Uuid, ServiceError> {
    let now = Utc::now();
    let id = Uuid::new_v4();
    outbox_event::ActiveModel {
        id: Set(id),
        aggregate_type: Set("order".to_string()),
        aggregate_id: Set(event.order_id()),
        event_type: Set(event.name().to_string()),
        payload: Set(serde_json::to_value(event)?),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        error_message: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        processed_at: Set(None),
    }
    .insert(db)
    .await?;

    debug!(outbox_id = %id, event_type = event.name(), "enqueued outbox event");
    Ok(id)
}

/// Background worker that polls the outbox until the returned handle is aborted.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    notifications: Arc<NotificationService>,
    sender: EventSender,
    interval: Duration,
) -> JoinHandle<()> {
    info!(interval_ms = interval.as_millis() as u64, "Starting outbox worker");
    tokio::spawn(async move {
        loop {
            if let Err(e) = drain_once(&db, &notifications, &sender, BATCH_SIZE).await {
                error!("outbox worker error: {}", e);
            }
            sleep(interval).await;
        }
    })
}

/// Dispatches one batch of due events; returns how many were delivered.
///
/// Due means pending and available, or stuck in `processing` for longer than
/// [`PROCESSING_LEASE_SECS`]. A failing row is logged and the rest of the batch still runs.
pub async fn drain_once(
    db: &DatabaseConnection,
    notifications: &NotificationService,
    sender: &EventSender,
    batch_size: u64,
) -> Result<usize, ServiceError> {
    let now = Utc::now();
    let lease_expired = now - ChronoDuration::seconds(PROCESSING_LEASE_SECS);
    let due = OutboxEvent::find()
        .filter(
            Condition::any()
                .add(
                    Condition::all()
                        .add(outbox_event::Column::Status.eq(OutboxStatus::Pending))
                        .add(outbox_event::Column::AvailableAt.lte(now)),
                )
                .add(
                    Condition::all()
                        .add(outbox_event::Column::Status.eq(OutboxStatus::Processing))
                        .add(outbox_event::Column::UpdatedAt.lte(lease_expired)),
                ),
        )
        .order_by_asc(outbox_event::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut delivered = 0;
    for row in due {
        let id = row.id;
        match dispatch(db, notifications, sender, row).await {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(e) => {
                counter!("marketplace.outbox.errors", 1);
                error!(outbox_id = %id, error = %e, "outbox row could not be processed");
            }
        }
    }

    Ok(delivered)
}

/// Claims and dispatches one row; true when it was delivered.
async fn dispatch(
    db: &DatabaseConnection,
    notifications: &NotificationService,
    sender: &EventSender,
    row: outbox_event::Model,
) -> Result<bool, ServiceError> {
    if !claim(db, &row).await? {
        // another worker got it first
        return Ok(false);
    }
    if row.status == OutboxStatus::Processing {
        warn!(outbox_id = %row.id, attempts = row.attempts, "reclaimed outbox row after lease expiry");
    }
    let attempts = row.attempts + 1;

    let outcome = match serde_json::from_value::<Event>(row.payload.clone()) {
        Ok(event) => notifications.handle(&event).await.map(|_| event),
        Err(e) => Err(ServiceError::SerializationError(e.to_string())),
    };

    match outcome {
        Ok(event) => {
            mark_delivered(db, row.id).await?;
            counter!("marketplace.outbox.delivered", 1);
            sender.emit(event);
            Ok(true)
        }
        Err(e) => {
            warn!(outbox_id = %row.id, attempts, error = %e, "outbox dispatch failed");
            schedule_retry(db, row.id, attempts, &e.to_string()).await?;
            Ok(false)
        }
    }
}

/// Moves a row to `processing` if nobody touched it since it was read.
/// The attempt counter doubles as the optimistic version.
async fn claim(db: &DatabaseConnection, row: &outbox_event::Model) -> Result<bool, ServiceError> {
    let result = OutboxEvent::update_many()
        .col_expr(
            outbox_event::Column::Status,
            Expr::value(OutboxStatus::Processing),
        )
        .col_expr(
            outbox_event::Column::Attempts,
            Expr::value(row.attempts + 1),
        )
        .col_expr(outbox_event::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(outbox_event::Column::Id.eq(row.id))
        .filter(outbox_event::Column::Status.eq(row.status))
        .filter(outbox_event::Column::Attempts.eq(row.attempts))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn mark_delivered(db: &DatabaseConnection, id: Uuid) -> Result<(), ServiceError> {
    let now = Utc::now();
    outbox_event::ActiveModel {
        id: Set(id),
        status: Set(OutboxStatus::Delivered),
        processed_at: Set(Some(now)),
        updated_at: Set(now),
        error_message: Set(None),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}

/// Exponential backoff (`2^attempts` seconds) until [`MAX_ATTEMPTS`], then `failed`.
async fn schedule_retry(
    db: &DatabaseConnection,
    id: Uuid,
    attempts: i32,
    error_message: &str,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let mut model = outbox_event::ActiveModel {
        id: Set(id),
        updated_at: Set(now),
        error_message: Set(Some(error_message.to_string())),
        ..Default::default()
    };

    if attempts < MAX_ATTEMPTS {
        model.status = Set(OutboxStatus::Pending);
        model.available_at = Set(now + backoff(attempts));
    } else {
        counter!("marketplace.outbox.failed", 1);
        error!(outbox_id = %id, attempts, "outbox event exhausted its attempts");
        model.status = Set(OutboxStatus::Failed);
    }

    model.update(db).await?;
    Ok(())
}

fn backoff(attempts: i32) -> ChronoDuration {
    ChronoDuration::seconds(BASE_BACKOFF_SECS.saturating_pow(attempts.max(0) as u32))
}
