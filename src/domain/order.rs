use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::round_minor;
use super::{OrderId, UserId};

/// One order line as the settlement engine sees it: the vendor-facing price,
/// the customer-facing price, and the quantity sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub store_price: Decimal,
    pub listed_price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    PartiallyRefunded,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

fn default_currency() -> String {
    "NGN".to_string()
}

/// Snapshot of an order at settlement time. Owned by the order service; the
/// engine only reads it and writes back the payment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: UserId,
    pub vendor: UserId,
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub delivery_fee: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_agent: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_category: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

impl Order {
    /// Customer-facing order total: listed prices plus the delivery fee,
    /// rounded at aggregation.
    pub fn total(&self) -> Decimal {
        let listed: Decimal = self
            .lines
            .iter()
            .map(|l| l.listed_price * Decimal::from(l.quantity))
            .sum();
        round_minor(listed + self.delivery_fee)
    }

    pub fn has_dispatch(&self) -> bool {
        self.delivery_agent.is_some()
    }
}
