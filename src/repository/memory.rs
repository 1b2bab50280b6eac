use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{OrderRepository, RepositoryError};
use crate::domain::order::{Order, OrderId};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    // Creation order, since ids alone do not sort reliably within a millisecond
    sequence: Vec<OrderId>,
}

/// Process-local repository backed by a map
#[derive(Default)]
pub struct InMemoryOrderRepository {
    tables: RwLock<Tables>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(RepositoryError::AlreadyExists(order.id));
        }

        tables.sequence.push(order.id);
        tables.orders.insert(order.id, order.clone());

        tracing::debug!(order_id = %order.id, "Order inserted");
        Ok(())
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn save(&self, order: &Order, expected_version: u64) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::Missing(order.id))?;

        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                order_id: order.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        *stored = order.clone();

        tracing::debug!(
            order_id = %order.id,
            version = order.version,
            "Order saved"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sequence
            .iter()
            .filter_map(|id| tables.orders.get(id).cloned())
            .collect())
    }
}
