// ============================================================================
// Order Domain - Business Logic for Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderId, Money, LineItem, OrderStatus)
// - Events (OrderCreated, ItemAdded, OrderShipped, etc.)
// - Commands (CreateOrder, OrderCommand)
// - Errors (OrderError enum and its ErrorKind taxonomy)
// - Guards (transition table and allowed actions)
// - Aggregate (Order with business logic)
// - Queries (OrderFilter)
//
// Nothing here knows about locking, storage or metrics.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod guards;
pub mod aggregate;
pub mod query;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use guards::{AllowedActions, Transition};
pub use aggregate::*;
pub use query::*;
