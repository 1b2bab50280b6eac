use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::order::{OrderError, OrderId};

// ============================================================================
// Per-order Lock Table
// ============================================================================
//
// One async mutex per order id, created on first use and removed again once
// nobody holds or waits for it. Every reference to a slot outside the table
// is owned by a guard that prunes on drop, so an abandoned wait cannot strand
// an entry.
//
// ============================================================================

type Slot = Arc<AsyncMutex<()>>;

#[derive(Default)]
pub struct OrderLocks {
    slots: DashMap<OrderId, Slot>,
}

/// Exclusive access to one order until dropped
pub struct OrderLockGuard<'a> {
    locks: &'a OrderLocks,
    order_id: OrderId,
    guard: Option<OwnedMutexGuard<()>>,
}

/// A caller queued on a slot; prunes it if the caller goes away
struct Waiting<'a> {
    locks: &'a OrderLocks,
    order_id: OrderId,
    slot: Slot,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the order's lock, giving up with `Busy` after `timeout`
    pub async fn acquire(
        &self,
        order_id: OrderId,
        timeout: Option<Duration>,
    ) -> Result<OrderLockGuard<'_>, OrderError> {
        let waiting = Waiting {
            locks: self,
            order_id,
            slot: self.slots.entry(order_id).or_default().clone(),
        };
        let guard = waiting.lock(timeout).await?;
        drop(waiting);

        Ok(OrderLockGuard {
            locks: self,
            order_id,
            guard: Some(guard),
        })
    }

    /// Remove the slot when the table and `outside` references are all that remain
    fn prune(&self, order_id: OrderId, outside: usize) {
        self.slots
            .remove_if(&order_id, |_, slot| Arc::strong_count(slot) == 1 + outside);
    }

    /// Number of orders with a live slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Waiting<'_> {
    async fn lock(&self, timeout: Option<Duration>) -> Result<OwnedMutexGuard<()>, OrderError> {
        let pending = Arc::clone(&self.slot).lock_owned();
        match timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| OrderError::Busy { order_id: self.order_id, waited: limit }),
            None => Ok(pending.await),
        }
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        // Our own clone is the only one outside the table
        self.locks.prune(self.order_id, 1);
    }
}

impl OrderLockGuard<'_> {
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }
}

impl Drop for OrderLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(self.order_id, 0);
    }
}
