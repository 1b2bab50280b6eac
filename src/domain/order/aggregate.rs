use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::Aggregate;
use super::commands::{CreateOrder, OrderCommand};
use super::errors::OrderError;
use super::events::*;
use super::guards::{self, Transition};
use super::value_objects::{LineItem, Money, OrderId, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub version: u64,

    // Customer (immutable after creation)
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub shipping_address: Option<String>,

    // Current State (derived from events)
    pub items: Vec<LineItem>,
    pub status: OrderStatus,
    pub total_amount: Money,

    // Set once by their transitions
    pub tracking_number: Option<String>,
    pub cancellation_reason: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validate a creation request and produce the opening event
    pub fn create(request: &CreateOrder) -> Result<OrderCreated, OrderError> {
        let customer_id = guards::require_text(&request.customer_id, "customer id")?;
        let customer_name = guards::require_text(&request.customer_name, "customer name")?;

        Ok(OrderCreated {
            customer_id,
            customer_name,
            customer_email: guards::optional_text(request.customer_email.as_deref()),
            shipping_address: guards::optional_text(request.shipping_address.as_deref()),
            created_at: Utc::now(),
        })
    }

    pub fn item(&self, product_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    pub fn contains_item(&self, product_id: &str) -> bool {
        self.item(product_id).is_some()
    }

    fn recalculate_total(&mut self) -> Result<(), OrderError> {
        let subtotals = self
            .items
            .iter()
            .map(LineItem::subtotal)
            .collect::<Result<Vec<_>, _>>()?;
        self.total_amount = Money::try_sum(subtotals)?;
        Ok(())
    }

    /// Report the first broken invariant, if any
    pub fn check_invariants(&self) -> Result<(), String> {
        let subtotals: Result<Vec<_>, _> = self.items.iter().map(LineItem::subtotal).collect();
        let expected = subtotals
            .and_then(Money::try_sum)
            .map_err(|e| format!("total not computable: {e}"))?;
        if expected != self.total_amount {
            return Err(format!("total {} != sum of subtotals {}", self.total_amount, expected));
        }

        for (i, item) in self.items.iter().enumerate() {
            if self.items[..i].iter().any(|other| other.product_id == item.product_id) {
                return Err(format!("duplicate product id {}", item.product_id));
            }
        }

        let shipped = matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered);
        if shipped != self.tracking_number.is_some() {
            return Err(format!("tracking number inconsistent with status {}", self.status));
        }
        let cancelled = self.status == OrderStatus::Cancelled;
        if cancelled != self.cancellation_reason.is_some() {
            return Err(format!("cancellation reason inconsistent with status {}", self.status));
        }

        Ok(())
    }

    fn handle_add_item(&self, item: &LineItem) -> Result<Vec<OrderEvent>, OrderError> {
        guards::check_item_mutation(self.status, "add items to")?;
        let item = item.validated()?;

        if self.contains_item(&item.product_id) {
            return Err(OrderError::DuplicateItem(item.product_id));
        }

        // Reject now rather than fail while applying
        let subtotal = item.subtotal()?;
        if self.total_amount.checked_add(subtotal).is_none() {
            return Err(OrderError::InvalidInput("order total overflows".to_string()));
        }

        Ok(vec![OrderEvent::ItemAdded(ItemAdded {
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            added_at: Utc::now(),
        })])
    }

    fn handle_remove_item(&self, product_id: &str) -> Result<Vec<OrderEvent>, OrderError> {
        guards::check_item_mutation(self.status, "remove items from")?;

        let product_id = product_id.trim();
        if !self.contains_item(product_id) {
            return Err(OrderError::ItemNotFound {
                order_id: self.id,
                product_id: product_id.to_string(),
            });
        }

        Ok(vec![OrderEvent::ItemRemoved(ItemRemoved {
            product_id: product_id.to_string(),
            removed_at: Utc::now(),
        })])
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event, aggregate_id: Uuid) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                id: OrderId::from(aggregate_id),
                version: 1,
                customer_id: e.customer_id.clone(),
                customer_name: e.customer_name.clone(),
                customer_email: e.customer_email.clone(),
                shipping_address: e.shipping_address.clone(),
                items: Vec::new(),
                status: OrderStatus::Created,
                total_amount: Money::ZERO,
                tracking_number: None,
                cancellation_reason: None,
                created_at: e.created_at,
                updated_at: e.created_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) => {
                return Err(OrderError::Storage(format!("order {} created twice", self.id)));
            }
            OrderEvent::ItemAdded(e) => {
                self.items.push(LineItem::new(
                    e.product_id.clone(),
                    e.product_name.clone(),
                    e.quantity,
                    e.unit_price,
                ));
                self.recalculate_total()?;
                self.updated_at = e.added_at;
            }
            OrderEvent::ItemRemoved(e) => {
                self.items.retain(|item| item.product_id != e.product_id);
                self.recalculate_total()?;
                self.updated_at = e.removed_at;
            }
            OrderEvent::Confirmed(e) => {
                self.status = OrderStatus::Confirmed;
                self.updated_at = e.confirmed_at;
            }
            OrderEvent::Processed(e) => {
                self.status = OrderStatus::Processed;
                self.updated_at = e.processed_at;
            }
            OrderEvent::Shipped(e) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = Some(e.tracking_number.clone());
                self.updated_at = e.shipped_at;
            }
            OrderEvent::Delivered(e) => {
                self.status = OrderStatus::Delivered;
                self.updated_at = e.delivered_at;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
                self.updated_at = e.cancelled_at;
            }
        }

        self.version += 1;
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::AddItem { item } => self.handle_add_item(item),

            OrderCommand::RemoveItem { product_id } => self.handle_remove_item(product_id),

            OrderCommand::Confirm => {
                guards::check_transition(self.status, Transition::Confirm)?;
                if self.items.is_empty() {
                    return Err(OrderError::EmptyOrder);
                }

                Ok(vec![OrderEvent::Confirmed(OrderConfirmed {
                    confirmed_at: Utc::now(),
                })])
            }

            OrderCommand::Process => {
                guards::check_transition(self.status, Transition::Process)?;

                Ok(vec![OrderEvent::Processed(OrderProcessed {
                    processed_at: Utc::now(),
                })])
            }

            OrderCommand::Ship { tracking_number } => {
                guards::check_transition(self.status, Transition::Ship)?;
                let tracking_number = guards::require_text(tracking_number, "tracking number")?;

                Ok(vec![OrderEvent::Shipped(OrderShipped {
                    tracking_number,
                    shipped_at: Utc::now(),
                })])
            }

            OrderCommand::Cancel { reason } => {
                guards::check_transition(self.status, Transition::Cancel)?;
                let reason = guards::require_text(reason, "cancellation reason")?;

                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    reason,
                    cancelled_at: Utc::now(),
                })])
            }

            OrderCommand::Deliver => {
                guards::check_transition(self.status, Transition::Deliver)?;

                Ok(vec![OrderEvent::Delivered(OrderDelivered {
                    delivered_at: Utc::now(),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
