use crate::config::PaymentGatewayConfig;
use crate::errors::ServiceError;
use crate::services::addresses::AddressSnapshot;
use async_trait::async_trait;
use metrics::counter;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use url::Url;
use utoipa::ToSchema;

const SESSION_PATH: &str = "/gwprocess/v4/api.php";

/// Everything the hosted payment page needs for one staged checkout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewaySessionRequest {
    pub total_amount: Decimal,
    pub currency: String,
    pub tran_id: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub ipn_url: String,
    pub shipping_method: String,
    pub product_name: String,
    pub product_category: String,
    pub product_profile: String,
    pub cus_name: String,
    pub cus_email: String,
    pub cus_add1: String,
    pub cus_add2: String,
    pub cus_city: String,
    pub cus_state: String,
    pub cus_postcode: String,
    pub cus_country: String,
    pub cus_phone: String,
    pub cus_fax: String,
    pub ship_name: String,
    pub ship_add1: String,
    pub ship_add2: String,
    pub ship_city: String,
    pub ship_state: String,
    pub ship_postcode: String,
    pub ship_country: String,
}

/// Buyer contact fields copied into the gateway session
#[derive(Debug, Clone)]
pub struct GatewayContact<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub phone_number: &'a str,
}

impl GatewaySessionRequest {
    /// Builds the session request for a staged checkout identified by `tran_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn for_checkout(
        config: &PaymentGatewayConfig,
        backend_url: &str,
        tran_id: &str,
        total_amount: Decimal,
        item_count: usize,
        contact: GatewayContact<'_>,
        address: &AddressSnapshot,
        address_line2: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let line2 = address_line2.unwrap_or_default().to_string();
        Ok(Self {
            total_amount,
            currency: config.currency.clone(),
            tran_id: tran_id.to_string(),
            success_url: callback_url(backend_url, "success", Some(tran_id))?,
            fail_url: callback_url(backend_url, "fail", Some(tran_id))?,
            cancel_url: callback_url(backend_url, "cancel", Some(tran_id))?,
            ipn_url: callback_url(backend_url, "ipn", None)?,
            shipping_method: "Courier".to_string(),
            product_name: format!("Order for {} items", item_count),
            product_category: config.product_category.clone(),
            product_profile: "general".to_string(),
            cus_name: contact.full_name.to_string(),
            cus_email: contact.email.to_string(),
            cus_add1: address.address_line.clone(),
            cus_add2: line2.clone(),
            cus_city: address.city.clone(),
            cus_state: address.state.clone(),
            cus_postcode: address.zip_code.clone(),
            cus_country: address.country.clone(),
            cus_phone: contact.phone_number.to_string(),
            cus_fax: String::new(),
            ship_name: contact.full_name.to_string(),
            ship_add1: address.address_line.clone(),
            ship_add2: line2,
            ship_city: address.city.clone(),
            ship_state: address.state.clone(),
            ship_postcode: address.zip_code.clone(),
            ship_country: address.country.clone(),
        })
    }
}

/// `{backend}/api/v1/payment/{kind}`, with `tran_id` appended when given.
pub fn callback_url(
    backend_url: &str,
    kind: &str,
    tran_id: Option<&str>,
) -> Result<String, ServiceError> {
    let mut url = Url::parse(&format!(
        "{}/api/v1/payment/{}",
        backend_url.trim_end_matches('/'),
        kind
    ))
    .map_err(|e| ServiceError::InternalError(format!("invalid backend url: {}", e)))?;
    if let Some(tran_id) = tran_id {
        url.query_pairs_mut().append_pair("tran_id", tran_id);
    }
    Ok(url.into())
}

/// An opened hosted-payment session
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GatewaySession {
    #[serde(rename = "paymentUrl")]
    pub payment_url: String,
    pub sessionkey: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn init_session(
        &self,
        request: &GatewaySessionRequest,
    ) -> Result<GatewaySession, ServiceError>;
}

/// SSLCommerz v4 session API client
pub struct SslCommerzGateway {
    client: reqwest::Client,
    endpoint: String,
    store_id: String,
    store_password: String,
}

impl SslCommerzGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url(), SESSION_PATH),
            store_id: config.store_id.clone(),
            store_password: config.store_password.clone(),
        })
    }

    fn form<'a>(&'a self, request: &'a GatewaySessionRequest) -> Vec<(&'static str, String)> {
        let r = request;
        vec![
            ("store_id", self.store_id.clone()),
            ("store_passwd", self.store_password.clone()),
            ("total_amount", r.total_amount.normalize().to_string()),
            ("currency", r.currency.clone()),
            ("tran_id", r.tran_id.clone()),
            ("success_url", r.success_url.clone()),
            ("fail_url", r.fail_url.clone()),
            ("cancel_url", r.cancel_url.clone()),
            ("ipn_url", r.ipn_url.clone()),
            ("shipping_method", r.shipping_method.clone()),
            ("product_name", r.product_name.clone()),
            ("product_category", r.product_category.clone()),
            ("product_profile", r.product_profile.clone()),
            ("cus_name", r.cus_name.clone()),
            ("cus_email", r.cus_email.clone()),
            ("cus_add1", r.cus_add1.clone()),
            ("cus_add2", r.cus_add2.clone()),
            ("cus_city", r.cus_city.clone()),
            ("cus_state", r.cus_state.clone()),
            ("cus_postcode", r.cus_postcode.clone()),
            ("cus_country", r.cus_country.clone()),
            ("cus_phone", r.cus_phone.clone()),
            ("cus_fax", r.cus_fax.clone()),
            ("ship_name", r.ship_name.clone()),
            ("ship_add1", r.ship_add1.clone()),
            ("ship_add2", r.ship_add2.clone()),
            ("ship_city", r.ship_city.clone()),
            ("ship_state", r.ship_state.clone()),
            ("ship_postcode", r.ship_postcode.clone()),
            ("ship_country", r.ship_country.clone()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    #[instrument(skip(self, request), fields(tran_id = %request.tran_id))]
    async fn init_session(
        &self,
        request: &GatewaySessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let send = self.client.post(&self.endpoint).form(&self.form(request)).send();
        let response = crate::tracing::timed("gateway.init_session", send)
            .await
            .map_err(|e| {
                counter!("marketplace.gateway.transport_errors", 1);
                ServiceError::ExternalServiceError(format!("payment gateway unreachable: {}", e))
            })?;

        let payload: Value = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("payment gateway sent invalid JSON: {}", e))
        })?;

        parse_session(payload)
    }
}

/// A response is a session only when it carries `GatewayPageURL`.
fn parse_session(payload: Value) -> Result<GatewaySession, ServiceError> {
    match payload
        .get("GatewayPageURL")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
    {
        Some(url) => {
            info!("payment session created");
            counter!("marketplace.gateway.sessions", 1);
            Ok(GatewaySession {
                payment_url: url.to_string(),
                sessionkey: payload
                    .get("sessionkey")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        None => {
            let message = payload
                .get("failedreason")
                .and_then(Value::as_str)
                .filter(|reason| !reason.is_empty())
                .unwrap_or("Gateway did not return a payment page")
                .to_string();
            warn!(%message, "payment gateway rejected session");
            counter!("marketplace.gateway.rejections", 1);
            Err(ServiceError::GatewayRejected { message, payload })
        }
    }
}
