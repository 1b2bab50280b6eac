// ============================================================================
// Order Lifecycle Engine
// ============================================================================
//
// Orchestrates: Lock → Load → Aggregate → Events → Repository → Event Store
//
// 1. At most one mutation per order is in flight (keyed lock table)
// 2. The repository is the source of truth; nothing is cached between calls
// 3. A rejected command leaves the order and the event log untouched
//
// ============================================================================

mod locks;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::order::{
    AllowedActions, CreateOrder, LineItem, Money, Order, OrderCommand, OrderError, OrderEvent,
    OrderFilter, OrderId, OrderStatus,
};
use crate::event_sourcing::{Aggregate, EventEnvelope, EventStore};
use crate::metrics::Metrics;
use crate::repository::OrderRepository;

pub use locks::{OrderLockGuard, OrderLocks};

const AGGREGATE_TYPE: &str = "Order";

pub struct OrderLifecycleEngine {
    repository: Arc<dyn OrderRepository>,
    event_store: EventStore<OrderEvent>,
    locks: OrderLocks,
    config: EngineConfig,
    metrics: Arc<Metrics>,
}

impl OrderLifecycleEngine {
    pub fn new(repository: Arc<dyn OrderRepository>, config: EngineConfig) -> anyhow::Result<Self> {
        Ok(Self::with_metrics(repository, config, Arc::new(Metrics::new()?)))
    }

    /// Share a metrics registry the host already exposes
    pub fn with_metrics(
        repository: Arc<dyn OrderRepository>,
        config: EngineConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repository,
            event_store: EventStore::new(AGGREGATE_TYPE, config.event_channel_capacity),
            locks: OrderLocks::new(),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // ========================================================================
    // Creation
    // ========================================================================

    pub async fn create_order(&self, request: CreateOrder) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.try_create_order(&request).await;

        match &result {
            Ok(order) => {
                self.metrics.orders_created.inc();
                tracing::info!(
                    order_id = %order.id,
                    customer_id = %order.customer_id,
                    "✅ Order created"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = e.kind().as_str(),
                    "Order creation rejected"
                );
            }
        }
        self.metrics
            .record_command("create", started.elapsed(), result.as_ref().err().map(OrderError::kind));

        result
    }

    async fn try_create_order(&self, request: &CreateOrder) -> Result<Order, OrderError> {
        let created = OrderEvent::Created(Order::create(request)?);
        let order_id = OrderId::new();
        let order = Order::apply_first_event(&created, order_id.as_uuid())?;

        self.repository.insert(&order).await?;

        let envelope = EventEnvelope::new(order_id.as_uuid(), 1, created, order_id.as_uuid())
            .with_causation(Uuid::new_v4())
            .with_metadata("command", "create");
        self.event_store.append_events(order_id.as_uuid(), 0, vec![envelope])?;

        Ok(order)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn add_item(&self, order_id: OrderId, item: LineItem) -> Result<Order, OrderError> {
        self.execute(order_id, OrderCommand::AddItem { item }, None).await
    }

    pub async fn remove_item(
        &self,
        order_id: OrderId,
        product_id: impl Into<String>,
    ) -> Result<Order, OrderError> {
        let product_id = product_id.into();
        self.execute(order_id, OrderCommand::RemoveItem { product_id }, None).await
    }

    pub async fn confirm(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.execute(order_id, OrderCommand::Confirm, None).await
    }

    pub async fn process(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.execute(order_id, OrderCommand::Process, None).await
    }

    pub async fn ship(
        &self,
        order_id: OrderId,
        tracking_number: impl Into<String>,
    ) -> Result<Order, OrderError> {
        let tracking_number = tracking_number.into();
        self.execute(order_id, OrderCommand::Ship { tracking_number }, None).await
    }

    pub async fn cancel(&self, order_id: OrderId, reason: impl Into<String>) -> Result<Order, OrderError> {
        let reason = reason.into();
        self.execute(order_id, OrderCommand::Cancel { reason }, None).await
    }

    pub async fn deliver(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.execute(order_id, OrderCommand::Deliver, None).await
    }

    /// Run one command under the order's lock.
    ///
    /// `lock_timeout` overrides the configured default for this call only.
    /// On failure the stored order and its event stream are unchanged.
    pub async fn execute(
        &self,
        order_id: OrderId,
        command: OrderCommand,
        lock_timeout: Option<Duration>,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.run_command(order_id, &command, lock_timeout).await;

        match &result {
            Ok(order) => {
                tracing::info!(
                    order_id = %order_id,
                    command = command.name(),
                    status = %order.status,
                    version = order.version,
                    total = %order.total_amount,
                    "✅ Order command applied"
                );
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %order_id,
                    command = command.name(),
                    error = %e,
                    kind = e.kind().as_str(),
                    "Order command rejected"
                );
            }
        }
        self.metrics
            .record_command(command.name(), started.elapsed(), result.as_ref().err().map(OrderError::kind));

        result
    }

    async fn run_command(
        &self,
        order_id: OrderId,
        command: &OrderCommand,
        lock_timeout: Option<Duration>,
    ) -> Result<Order, OrderError> {
        let timeout = lock_timeout.or(self.config.lock_timeout);

        let wait_started = Instant::now();
        let acquired = self.locks.acquire(order_id, timeout).await;
        self.metrics.record_lock_wait(wait_started.elapsed(), acquired.is_ok());
        let _guard = acquired?;

        tracing::debug!(
            order_id = %order_id,
            command = command.name(),
            waited = ?wait_started.elapsed(),
            "Order lock acquired"
        );

        let current = self
            .repository
            .load(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let events = current.handle_command(command)?;

        let mut updated = current.clone();
        for event in &events {
            updated.apply_event(event)?;
        }

        self.repository.save(&updated, current.version).await?;

        // The save has committed. The append below runs before the lock is
        // released and has no await, so the log catches up with the
        // repository before the next command on this order can start.
        let command_id = Uuid::new_v4();
        let envelopes: Vec<_> = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                EventEnvelope::new(order_id.as_uuid(), current.version + i as u64 + 1, event, order_id.as_uuid())
                    .with_causation(command_id)
                    .with_metadata("command", command.name())
            })
            .collect();
        if let Err(e) = self
            .event_store
            .append_events(order_id.as_uuid(), current.version, envelopes)
        {
            tracing::error!(
                order_id = %order_id,
                command = command.name(),
                version = updated.version,
                error = %e,
                "❌ Order saved but its events were not recorded"
            );
            return Err(e.into());
        }

        Ok(updated)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.repository
            .load(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Orders in creation order, optionally restricted to one status
    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter {
            status,
            ..OrderFilter::default()
        };
        self.find_orders(&filter).await
    }

    pub async fn find_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        let orders = self.repository.list().await?;
        Ok(orders.into_iter().filter(|order| filter.matches(order)).collect())
    }

    pub async fn count_by_status(&self, status: OrderStatus) -> Result<u64, OrderError> {
        Ok(self.list_orders(Some(status)).await?.len() as u64)
    }

    /// Mean order total for a status, `None` when no order has it
    pub async fn average_total_by_status(&self, status: OrderStatus) -> Result<Option<Money>, OrderError> {
        let orders = self.list_orders(Some(status)).await?;
        Ok(Money::mean(orders.iter().map(|order| order.total_amount)))
    }

    pub async fn allowed_actions(&self, order_id: OrderId) -> Result<AllowedActions, OrderError> {
        Ok(AllowedActions::for_order(&self.get_order(order_id).await?))
    }

    // ========================================================================
    // Event Log
    // ========================================================================

    /// Every envelope recorded for the order, oldest first.
    ///
    /// Envelopes are correlated by order id and caused by one id per command.
    /// The log is appended right after the repository save, under the same
    /// order lock, so a reader that does not take the lock may briefly see
    /// a saved order whose latest events are not listed yet. Once a command
    /// has returned, the history always matches the order's version.
    pub fn order_history(&self, order_id: OrderId) -> Result<Vec<EventEnvelope<OrderEvent>>, OrderError> {
        let history = self.event_store.load_events(order_id.as_uuid())?;
        if history.is_empty() {
            return Err(OrderError::OrderNotFound(order_id));
        }
        Ok(history)
    }

    /// Rebuild the order purely from its event stream; same lag as [`Self::order_history`]
    pub fn replay_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        if !self.event_store.aggregate_exists(order_id.as_uuid())? {
            return Err(OrderError::OrderNotFound(order_id));
        }
        self.event_store
            .load_aggregate::<Order>(order_id.as_uuid())
            .map_err(|e| OrderError::Storage(e.to_string()))
    }

    /// Every envelope appended from now on, across all orders
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope<OrderEvent>> {
        self.event_store.subscribe()
    }

    pub fn subscribe_order(&self, order_id: OrderId) -> OrderSubscription {
        OrderSubscription {
            order_id,
            receiver: self.event_store.subscribe(),
        }
    }
}

/// Change feed for a single order
pub struct OrderSubscription {
    order_id: OrderId,
    receiver: broadcast::Receiver<EventEnvelope<OrderEvent>>,
}

impl OrderSubscription {
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Next envelope for this order; `Lagged` is passed through so the caller can resync
    pub async fn recv(&mut self) -> Result<EventEnvelope<OrderEvent>, broadcast::error::RecvError> {
        loop {
            let envelope = self.receiver.recv().await?;
            if envelope.aggregate_id == self.order_id.as_uuid() {
                return Ok(envelope);
            }
        }
    }
}

#[cfg(test)]
mod tests;
