//! Human-readable order numbers (`ORD-#####`) and transaction ids (`TXN-#######`).

use crate::entities::{order, Order};
use crate::errors::ServiceError;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

pub const ORDER_NUMBER_PREFIX: &str = "ORD-";
pub const TRANSACTION_ID_PREFIX: &str = "TXN-";

const ORDER_NUMBER_DIGITS: usize = 5;
const TRANSACTION_ID_DIGITS: usize = 7;

/// Draws before giving up on finding an unused identifier
const MAX_DRAWS: usize = 64;

static ORDER_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ORD-\d{5}$").unwrap());
static TRANSACTION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^TXN-\d{7}$").unwrap());

fn random_digits<R: Rng + ?Sized>(rng: &mut R, digits: usize) -> String {
    (0..digits)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn draw_order_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}{}", ORDER_NUMBER_PREFIX, random_digits(rng, ORDER_NUMBER_DIGITS))
}

pub fn draw_transaction_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}{}",
        TRANSACTION_ID_PREFIX,
        random_digits(rng, TRANSACTION_ID_DIGITS)
    )
}

pub fn is_order_number(value: &str) -> bool {
    ORDER_NUMBER_RE.is_match(value)
}

pub fn is_transaction_id(value: &str) -> bool {
    TRANSACTION_ID_RE.is_match(value)
}

/// Draws order numbers until one is not present in `orders`.
pub async fn unique_order_number<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
    for _ in 0..MAX_DRAWS {
        let candidate = draw_order_number(&mut rand::thread_rng());
        let taken = Order::find()
            .filter(order::Column::OrderNumber.eq(candidate.as_str()))
            .count(conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
    Err(ServiceError::Conflict(
        "Could not allocate a free order number".to_string(),
    ))
}

/// Draws transaction ids until one is not present in `orders`.
pub async fn unique_transaction_id<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
    for _ in 0..MAX_DRAWS {
        let candidate = draw_transaction_id(&mut rand::thread_rng());
        let taken = Order::find()
            .filter(order::Column::TransactionId.eq(candidate.as_str()))
            .count(conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
    Err(ServiceError::Conflict(
        "Could not allocate a free transaction id".to_string(),
    ))
}
