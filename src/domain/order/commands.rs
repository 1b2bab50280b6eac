use super::value_objects::LineItem;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// Request to open a new order
#[derive(Debug, Clone, Default)]
pub struct CreateOrder {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub shipping_address: Option<String>,
}

impl CreateOrder {
    pub fn new(customer_id: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_shipping_address(mut self, address: impl Into<String>) -> Self {
        self.shipping_address = Some(address.into());
        self
    }
}

/// Commands against an existing order
#[derive(Debug, Clone)]
pub enum OrderCommand {
    AddItem {
        item: LineItem,
    },
    RemoveItem {
        product_id: String,
    },
    Confirm,
    Process,
    Ship {
        tracking_number: String,
    },
    Cancel {
        reason: String,
    },
    Deliver,
}

impl OrderCommand {
    /// Stable name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::AddItem { .. } => "add_item",
            OrderCommand::RemoveItem { .. } => "remove_item",
            OrderCommand::Confirm => "confirm",
            OrderCommand::Process => "process",
            OrderCommand::Ship { .. } => "ship",
            OrderCommand::Cancel { .. } => "cancel",
            OrderCommand::Deliver => "deliver",
        }
    }
}
