//! Periodic reaper for staged checkouts whose callback never arrived.

use crate::{
    entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus},
    entities::Order,
    errors::ServiceError,
    events::{Event, EventSender},
    services::temp_orders,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_checkouts: usize,
    pub orders_failed: usize,
    pub orphans_cancelled: usize,
}

#[derive(Clone)]
pub struct SweeperService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
    orphan_grace: ChronoDuration,
}

impl SweeperService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender, orphan_grace: ChronoDuration) -> Self {
        Self {
            db,
            events,
            orphan_grace,
        }
    }

    /// Runs until the handle is aborted.
    pub fn start(self, every: Duration) -> JoinHandle<()> {
        info!(interval_secs = every.as_secs(), "Starting checkout sweeper");
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once(Utc::now()).await {
                    error!("checkout sweep failed: {}", e);
                }
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let (expired_checkouts, orders_failed) = self.expire_staged(now).await?;
        let orphans_cancelled = self.cancel_orphans(now).await?;
        Ok(SweepReport {
            expired_checkouts,
            orders_failed,
            orphans_cancelled,
        })
    }

    /// Fails the still-pending orders of every expired staging row and deletes the row.
    /// Returns `(rows reaped, orders failed)`.
    pub async fn expire_staged(&self, now: DateTime<Utc>) -> Result<(usize, usize), ServiceError> {
        let mut reaped = 0;
        let mut failed = 0;

        for staged in temp_orders::expired(&*self.db, now).await? {
            let txn = self.db.begin().await?;
            let affected = fail_pending(&txn, staged.order_refs(), now).await?;
            if temp_orders::delete(&txn, staged.id).await? == 0 {
                // settled or compensated meanwhile
                continue;
            }
            txn.commit().await?;

            reaped += 1;
            failed += affected;
            self.events.emit(Event::StagedCheckoutExpired {
                temp_order_id: staged.id,
                orders: affected,
            });
        }

        if reaped > 0 {
            counter!("marketplace.sweeper.expired_checkouts", reaped as u64);
            info!(reaped, failed, "expired staged checkouts");
        }
        Ok((reaped, failed))
    }

    /// Fails gateway orders left pending past the grace period with no live staging row.
    pub async fn cancel_orphans(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let cutoff = now - self.orphan_grace;
        let candidates: Vec<Uuid> = Order::find()
            .filter(order::Column::PaymentMethod.eq(PaymentMethod::Gateway))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let live = temp_orders::live_order_ids(&*self.db, now).await?;
        let orphans: Vec<Uuid> = candidates
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        let count = fail_pending(&*self.db, orphans, now).await?;
        if count > 0 {
            counter!("marketplace.sweeper.orphans_cancelled", count as u64);
            info!(count, "cancelled orphaned gateway orders");
            self.events.emit(Event::OrphanedOrdersCancelled { count });
        }
        Ok(count)
    }
}

/// `failed/cancelled` for those of `ids` whose payment is still pending.
async fn fail_pending<C: ConnectionTrait>(
    conn: &C,
    ids: Vec<Uuid>,
    now: DateTime<Utc>,
) -> Result<usize, ServiceError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = Order::update_many()
        .col_expr(
            order::Column::PaymentStatus,
            Expr::value(PaymentStatus::Failed),
        )
        .col_expr(
            order::Column::OrderStatus,
            Expr::value(OrderStatus::Cancelled),
        )
        .col_expr(order::Column::UpdatedAt, Expr::value(now))
        .filter(order::Column::Id.is_in(ids))
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .exec(conn)
        .await?;
    Ok(result.rows_affected as usize)
}
