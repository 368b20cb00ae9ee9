pub mod checkout;
pub mod common;
pub mod orders;
pub mod payments;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    checkout::CheckoutService, notifications::NotificationService, orders::OrderService,
    payment_callbacks::PaymentCallbackService, payment_gateway::PaymentGateway,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentCallbackService>,
    pub notifications: Arc<NotificationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            auth: Arc::new(AuthService::new(config.jwt_secret.clone(), db.clone())),
            checkout: Arc::new(CheckoutService::new(db.clone(), gateway, config.clone())),
            orders: Arc::new(OrderService::new(db.clone())),
            payments: Arc::new(PaymentCallbackService::new(
                db.clone(),
                event_sender,
                config.frontend_url().to_string(),
            )),
            notifications: Arc::new(NotificationService::new(db)),
        }
    }
}
