use crate::errors::ApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// `{success, count, <key>: [...]}` list envelope used by the order listings
#[derive(Debug, Serialize)]
pub struct CountedList<T> {
    pub success: bool,
    pub count: usize,
    #[serde(flatten)]
    pub items: ListItems<T>,
}

#[derive(Debug, Serialize)]
pub enum ListItems<T> {
    #[serde(rename = "orders")]
    Orders(Vec<T>),
    #[serde(rename = "data")]
    Data(Vec<T>),
}

impl<T> CountedList<T> {
    pub fn orders(items: Vec<T>) -> Self {
        Self {
            success: true,
            count: items.len(),
            items: ListItems::Orders(items),
        }
    }

    pub fn data(items: Vec<T>) -> Self {
        Self {
            success: true,
            count: items.len(),
            items: ListItems::Data(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counted_lists_name_their_items() {
        let orders = serde_json::to_value(CountedList::orders(vec![1, 2])).unwrap();
        assert_eq!(orders, json!({ "success": true, "count": 2, "orders": [1, 2] }));

        let data = serde_json::to_value(CountedList::<u8>::data(vec![])).unwrap();
        assert_eq!(data, json!({ "success": true, "count": 0, "data": [] }));
    }
}
