//! Settles or compensates staged gateway checkouts when the gateway redirects back.

use crate::{
    entities::order::{self, PaymentStatus},
    entities::{temp_order, Order},
    errors::ServiceError,
    events::{outbox, Event, EventSender},
    services::{addresses, carts, shipping, temp_orders},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Where the browser lands after a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Fail,
}

impl PaymentOutcome {
    fn path(self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::Fail => "fail",
        }
    }
}

/// `{frontend}/payment/{success|fail}?tran_id=...`
pub fn frontend_redirect(frontend_url: &str, outcome: PaymentOutcome, tran_id: &str) -> String {
    let raw = format!(
        "{}/payment/{}",
        frontend_url.trim_end_matches('/'),
        outcome.path()
    );
    match Url::parse(&raw) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("tran_id", tran_id);
            url.into()
        }
        Err(_) => format!("{}?tran_id={}", raw, tran_id),
    }
}

#[derive(Clone)]
pub struct PaymentCallbackService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
    frontend_url: String,
}

impl PaymentCallbackService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender, frontend_url: String) -> Self {
        Self {
            db,
            events,
            frontend_url,
        }
    }

    fn redirect(&self, outcome: PaymentOutcome, tran_id: &str) -> String {
        frontend_redirect(&self.frontend_url, outcome, tran_id)
    }

    /// Handles the success callback and returns the redirect target.
    ///
    /// A replayed token finds no staging row and lands on the failure page without touching orders.
    #[instrument(skip(self))]
    pub async fn settle_success(&self, tran_id: Option<&str>) -> String {
        let Some(token) = tran_id.filter(|t| temp_orders::is_token(t)) else {
            warn!("success callback without a staged token");
            return self.redirect(PaymentOutcome::Fail, "invalid");
        };
        let Some(id) = temp_orders::parse_token(token) else {
            return self.redirect(PaymentOutcome::Fail, token);
        };

        match self.finalize(id).await {
            Ok(Some(settled)) => {
                counter!("marketplace.payments.settled", 1);
                info!(temp_order_id = %id, orders = settled, "payment settled");
                self.redirect(PaymentOutcome::Success, token)
            }
            Ok(None) => {
                warn!(temp_order_id = %id, "no staged checkout for token");
                self.redirect(PaymentOutcome::Fail, token)
            }
            Err(e) => {
                counter!("marketplace.payments.settlement_errors", 1);
                error!(temp_order_id = %id, error = %e, "payment settlement failed");
                self.redirect(PaymentOutcome::Fail, token)
            }
        }
    }

    /// Handles the fail and cancel callbacks: compensates when a staging row exists,
    /// then always redirects to the failure page.
    #[instrument(skip(self))]
    pub async fn compensate(&self, tran_id: Option<&str>) -> String {
        let token = tran_id.filter(|t| !t.is_empty()).unwrap_or("unknown");

        if let Some(id) = temp_orders::parse_token(token) {
            match temp_orders::find(&*self.db, id).await {
                Ok(Some(staged)) => {
                    if let Err(e) = self.rollback(&staged).await {
                        counter!("marketplace.payments.rollback_errors", 1);
                        error!(temp_order_id = %id, error = %e, "checkout rollback failed");
                    }
                }
                Ok(None) => {}
                Err(e) => error!(temp_order_id = %id, error = %e, "staged checkout lookup failed"),
            }
        }

        self.redirect(PaymentOutcome::Fail, token)
    }

    /// Marks every staged order paid, cleans up carts and deletes the staging row, atomically.
    /// `None` when the row is already gone.
    async fn finalize(&self, id: Uuid) -> Result<Option<usize>, ServiceError> {
        let txn = self.db.begin().await?;
        let Some(staged) = temp_orders::find(&txn, id).await? else {
            return Ok(None);
        };

        let order_ids = staged.order_refs();
        let orders = Order::find()
            .filter(order::Column::Id.is_in(order_ids))
            .all(&txn)
            .await?;

        let now = Utc::now();
        let settled = orders.len();
        for existing in orders {
            let mut active: order::ActiveModel = existing.into();
            active.payment_status = Set(PaymentStatus::Paid);
            active.updated_at = Set(now);
            let paid = active.update(&txn).await?;
            outbox::enqueue(
                &txn,
                &Event::PaymentReceived {
                    order_id: paid.id,
                    order_number: paid.order_number.clone(),
                    product_id: paid.product_id,
                },
            )
            .await?;
        }

        carts::remove_purchased_products(&txn, staged.customer_id, &staged.product_refs())
            .await?;

        if temp_orders::delete(&txn, staged.id).await? == 0 {
            // settled concurrently; dropping the transaction undoes this attempt
            return Ok(None);
        }
        txn.commit().await?;
        Ok(Some(settled))
    }

    /// Deletes everything the staged checkout created, in one transaction.
    ///
    /// `staged` may be stale. The staging row is deleted first and `None` is returned when it was
    /// already gone, which means a success callback or the sweeper resolved the checkout.
    #[instrument(skip(self, staged), fields(temp_order_id = %staged.id))]
    pub async fn rollback(&self, staged: &temp_order::Model) -> Result<Option<usize>, ServiceError> {
        let txn = self.db.begin().await?;

        if temp_orders::delete(&txn, staged.id).await? == 0 {
            debug!("staged checkout already resolved; nothing to roll back");
            return Ok(None);
        }

        let removed = Order::delete_many()
            .filter(order::Column::Id.is_in(staged.order_refs()))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&txn)
            .await?
            .rows_affected as usize;
        shipping::delete_shipping_info(&txn, staged.shipping_info_id).await?;
        if !staged.primary_address_existing {
            addresses::delete_address(&txn, staged.primary_address_id).await?;
        }
        if let Some(optional_id) = staged.optional_address_id {
            addresses::delete_address(&txn, optional_id).await?;
        }
        txn.commit().await?;

        counter!("marketplace.payments.compensated", 1);
        info!(orders_removed = removed, "staged checkout rolled back");
        self.events.emit(Event::CheckoutCompensated {
            temp_order_id: staged.id,
            orders_removed: removed,
        });
        Ok(Some(removed))
    }
}
