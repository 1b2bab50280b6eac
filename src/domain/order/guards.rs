//! Transition guards for the order state machine.
//!
//! ```text
//! CREATED   --confirm--> CONFIRMED
//! CONFIRMED --process--> PROCESSED
//! PROCESSED --ship-----> SHIPPED
//! SHIPPED   --deliver--> DELIVERED
//! {CREATED, CONFIRMED, PROCESSED} --cancel--> CANCELLED
//! ```
//!
//! DELIVERED and CANCELLED are terminal. Every function here is pure: it
//! inspects state and never mutates it.

use serde::Serialize;

use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::OrderStatus;

/// Status-changing edges of the order graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Confirm,
    Process,
    Ship,
    Cancel,
    Deliver,
}

impl Transition {
    pub const ALL: [Transition; 5] = [
        Transition::Confirm,
        Transition::Process,
        Transition::Ship,
        Transition::Cancel,
        Transition::Deliver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Process => "process",
            Transition::Ship => "ship",
            Transition::Cancel => "cancel",
            Transition::Deliver => "deliver",
        }
    }

    /// Target status when the edge exists from `from`
    pub fn target(&self, from: OrderStatus) -> Option<OrderStatus> {
        use OrderStatus::*;

        match (from, self) {
            (Created, Transition::Confirm) => Some(Confirmed),
            (Confirmed, Transition::Process) => Some(Processed),
            (Processed, Transition::Ship) => Some(Shipped),
            (Shipped, Transition::Deliver) => Some(Delivered),
            (Created | Confirmed | Processed, Transition::Cancel) => Some(Cancelled),
            _ => None,
        }
    }
}

/// Resolve an edge or fail with `InvalidState`
pub fn check_transition(status: OrderStatus, transition: Transition) -> Result<OrderStatus, OrderError> {
    transition
        .target(status)
        .ok_or_else(|| OrderError::invalid_state(transition.as_str(), status))
}

/// Items may only change while the order is still open
pub fn can_modify_items(status: OrderStatus) -> bool {
    status == OrderStatus::Created
}

pub fn check_item_mutation(status: OrderStatus, operation: &'static str) -> Result<(), OrderError> {
    if can_modify_items(status) {
        Ok(())
    } else {
        Err(OrderError::invalid_state(operation, status))
    }
}

pub fn can_transition(status: OrderStatus, transition: Transition) -> bool {
    transition.target(status).is_some()
}

/// Trimmed non-blank text, or `InvalidInput` naming the field
pub fn require_text(value: &str, field: &str) -> Result<String, OrderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(OrderError::InvalidInput(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Blank optional text collapses to `None`
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

// ============================================================================
// Allowed Actions - read-only projection of the guards
// ============================================================================

/// What a presentation layer may offer for an order right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllowedActions {
    pub can_add_items: bool,
    pub can_remove_items: bool,
    pub can_confirm: bool,
    pub can_process: bool,
    pub can_ship: bool,
    pub can_cancel: bool,
    pub can_deliver: bool,
}

impl AllowedActions {
    pub fn for_order(order: &Order) -> Self {
        let status = order.status;
        Self {
            can_add_items: can_modify_items(status),
            can_remove_items: can_modify_items(status) && !order.items.is_empty(),
            can_confirm: can_transition(status, Transition::Confirm) && !order.items.is_empty(),
            can_process: can_transition(status, Transition::Process),
            can_ship: can_transition(status, Transition::Ship),
            can_cancel: can_transition(status, Transition::Cancel),
            can_deliver: can_transition(status, Transition::Deliver),
        }
    }
}
