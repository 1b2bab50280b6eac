use std::time::Duration;
use serde::Serialize;

use super::value_objects::{MoneyError, OrderId, OrderStatus};
use crate::event_sourcing::EventStoreError;
use crate::repository::RepositoryError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot {operation} order in status {status}")]
    InvalidState {
        operation: &'static str,
        status: OrderStatus,
    },

    #[error("Cannot confirm order without items")]
    EmptyOrder,

    #[error("Item already present in order: {0}")]
    DuplicateItem(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Item {product_id} not found in order {order_id}")]
    ItemNotFound {
        order_id: OrderId,
        product_id: String,
    },

    #[error("Order {order_id} is busy: lock not acquired within {waited:?}")]
    Busy {
        order_id: OrderId,
        waited: Duration,
    },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Aggregate not initialized")]
    NotInitialized,
}

/// Failure taxonomy exposed to transport layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    InvalidState,
    EmptyOrder,
    DuplicateItem,
    NotFound,
    Busy,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::EmptyOrder => "empty_order",
            ErrorKind::DuplicateItem => "duplicate_item",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Busy => "busy",
            ErrorKind::Storage => "storage",
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidInput(_) => ErrorKind::InvalidInput,
            OrderError::InvalidState { .. } => ErrorKind::InvalidState,
            OrderError::EmptyOrder => ErrorKind::EmptyOrder,
            OrderError::DuplicateItem(_) => ErrorKind::DuplicateItem,
            OrderError::OrderNotFound(_) | OrderError::ItemNotFound { .. } => ErrorKind::NotFound,
            OrderError::Busy { .. } => ErrorKind::Busy,
            OrderError::Storage(_) | OrderError::NotInitialized => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, status: OrderStatus) -> Self {
        OrderError::InvalidState { operation, status }
    }
}

impl From<MoneyError> for OrderError {
    fn from(err: MoneyError) -> Self {
        OrderError::InvalidInput(err.to_string())
    }
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        OrderError::Storage(err.to_string())
    }
}

impl From<EventStoreError> for OrderError {
    fn from(err: EventStoreError) -> Self {
        OrderError::Storage(err.to_string())
    }
}
