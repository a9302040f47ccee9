use serde::{Deserialize, Serialize};

use crate::types::{NotificationPayload, Priority};

/// Delay after which a late delivery is treated as high priority.
pub const DELIVERY_DELAY_HIGH_MINUTES: u32 = 60;

/// Business events raised by the HR, inventory, sales and transport modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusinessEvent {
    LeaveRequested {
        employee_name: String,
        leave_id: String,
        days: u32,
    },
    StockLow {
        product_name: String,
        sku: String,
        quantity: u32,
        reorder_level: u32,
    },
    SaleRecorded {
        invoice_number: String,
        total: f64,
        currency: String,
    },
    DeliveryDelayed {
        trip_id: String,
        vehicle: String,
        delay_minutes: u32,
    },
}

impl BusinessEvent {
    /// Returns the notification type tag for the event.
    pub fn notification_type(&self) -> &'static str {
        match self {
            Self::LeaveRequested { .. } => "leave_request",
            Self::StockLow { .. } => "low_stock",
            Self::SaleRecorded { .. } => "sale",
            Self::DeliveryDelayed { .. } => "delivery_delay",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Self::LeaveRequested { .. } => Priority::Normal,
            Self::StockLow { quantity: 0, .. } => Priority::Urgent,
            Self::StockLow { .. } => Priority::High,
            Self::SaleRecorded { .. } => Priority::Low,
            Self::DeliveryDelayed { delay_minutes, .. } => {
                if *delay_minutes >= DELIVERY_DELAY_HIGH_MINUTES {
                    Priority::High
                } else {
                    Priority::Normal
                }
            }
        }
    }

    /// Builds the notification announcing this event within an organisation.
    pub fn to_payload(&self, organization_id: &str) -> NotificationPayload {
        let (title, message, link) = match self {
            Self::LeaveRequested {
                employee_name,
                leave_id,
                days,
            } => (
                "New leave request".to_string(),
                format!("{employee_name} requested {days} day(s) of leave"),
                format!("/hr/leaves/{leave_id}"),
            ),
            Self::StockLow {
                product_name,
                sku,
                quantity: 0,
                ..
            } => (
                "Out of stock".to_string(),
                format!("{product_name} ({sku}) is out of stock"),
                format!("/inventory/products/{sku}"),
            ),
            Self::StockLow {
                product_name,
                sku,
                quantity,
                reorder_level,
            } => (
                "Low stock".to_string(),
                format!(
                    "{product_name} ({sku}) is down to {quantity}, reorder level is {reorder_level}"
                ),
                format!("/inventory/products/{sku}"),
            ),
            Self::SaleRecorded {
                invoice_number,
                total,
                currency,
            } => (
                "New sale".to_string(),
                format!("Invoice {invoice_number} recorded for {total:.2} {currency}"),
                format!("/sales/invoices/{invoice_number}"),
            ),
            Self::DeliveryDelayed {
                trip_id,
                vehicle,
                delay_minutes,
            } => (
                "Delivery delayed".to_string(),
                format!("Trip {trip_id} ({vehicle}) is running {delay_minutes} minutes late"),
                format!("/transport/trips/{trip_id}"),
            ),
        };

        NotificationPayload::new(organization_id, self.notification_type(), title, message)
            .with_link(link)
            .with_priority(self.priority())
    }
}
