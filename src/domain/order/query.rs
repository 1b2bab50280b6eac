use super::aggregate::Order;
use super::value_objects::{Money, OrderStatus};

// ============================================================================
// Order Queries - Read-side filtering
// ============================================================================

/// Conjunctive filter over orders; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<String>,
    pub customer_name_contains: Option<String>,
    pub min_total: Option<Money>,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Case-insensitive substring of the customer name
    pub fn with_customer_name_containing(mut self, fragment: impl Into<String>) -> Self {
        self.customer_name_contains = Some(fragment.into());
        self
    }

    pub fn with_min_total(mut self, min_total: Money) -> Self {
        self.min_total = Some(min_total);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|status| status != order.status) {
            return false;
        }
        if let Some(customer_id) = &self.customer_id {
            if customer_id.trim() != order.customer_id {
                return false;
            }
        }
        if let Some(fragment) = &self.customer_name_contains {
            let needle = fragment.trim().to_lowercase();
            if !order.customer_name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if self.min_total.is_some_and(|min| order.total_amount < min) {
            return false;
        }
        true
    }
}
