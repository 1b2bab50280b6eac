// ============================================================================
// Order Repository - Persistence abstraction
// ============================================================================
//
// The engine only talks to this trait. Saves are compare-and-set on the
// order version so a stale writer can never overwrite a newer state.
//
// ============================================================================

mod memory;

use async_trait::async_trait;

use crate::domain::order::{Order, OrderId};

pub use memory::InMemoryOrderRepository;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Order {0} already exists")]
    AlreadyExists(OrderId),

    #[error("Order {0} is not stored")]
    Missing(OrderId),

    #[error("Version conflict on order {order_id}: expected {expected}, stored {actual}")]
    Conflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },

    /// Backend could not be reached; for implementations over external storage
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Store a brand new order
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn load(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Replace the stored order if it is still at `expected_version`
    async fn save(&self, order: &Order, expected_version: u64) -> Result<(), RepositoryError>;

    /// All orders in creation order
    async fn list(&self) -> Result<Vec<Order>, RepositoryError>;
}
