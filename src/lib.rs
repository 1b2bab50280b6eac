// ============================================================================
// Order Lifecycle Engine
// ============================================================================
//
// Layers, from the inside out:
// - domain:          Order aggregate, guards, events, value objects
// - event_sourcing:  generic aggregate trait, envelopes, in-memory event store
// - repository:      persistence seam (in-memory implementation included)
// - engine:          per-order locking and command orchestration
// - config, metrics: ambient settings and Prometheus instrumentation
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod engine;
pub mod event_sourcing;
pub mod metrics;
pub mod repository;

pub use config::{ConfigError, EngineConfig};
pub use domain::order::{
    AllowedActions, CreateOrder, ErrorKind, LineItem, Money, Order, OrderCommand, OrderError,
    OrderEvent, OrderFilter, OrderId, OrderStatus,
};
pub use engine::{OrderLifecycleEngine, OrderSubscription};
pub use repository::{InMemoryOrderRepository, OrderRepository, RepositoryError};
