//! Persisted record types.
//!
//! These mirror the relational tables one-to-one. Domain behavior lives in
//! the `domain` crate; this module only carries the shapes the backends
//! read and write.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId, StaffId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Boleto,
    Pix,
    Cash,
}

impl PaymentMethod {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Boleto => "boleto",
            Self::Pix => "pix",
            Self::Cash => "cash",
        }
    }

    /// Parses the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(Self::Card),
            "boleto" => Some(Self::Boleto),
            "pix" => Some(Self::Pix),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

/// Payment state of an order.
///
/// Payment is modeled as always approved at creation; no transitions are
/// exercised after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// A catalog product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Live unit price. Committed order lines keep their own copy.
    pub unit_price: Money,
    /// Sellable units on hand. Never negative; enforced transactionally
    /// and by a CHECK constraint in the PostgreSQL backend.
    pub stock_quantity: u32,
    pub category: String,
    pub locally_made: bool,
    pub image_path: String,
}

/// Fields for creating or replacing a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
    pub category: String,
    pub locally_made: bool,
    pub image_path: String,
}

/// Customer address fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub state: String,
}

/// A registered customer row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: CustomerId,
    pub name: String,
    /// Unique across all customers; enforced at the storage layer.
    pub email: String,
    /// Opaque credential hash. The store never inspects it.
    pub credential_hash: String,
    pub address: Address,
    pub phone: Option<String>,
    pub loyalty_member: bool,
    pub student: bool,
    pub local_resident: bool,
}

impl CustomerRecord {
    /// Any one eligibility flag grants the discount.
    pub fn discount_eligible(&self) -> bool {
        self.loyalty_member || self.student || self.local_resident
    }
}

/// Fields for registering a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub credential_hash: String,
    pub address: Address,
    pub phone: Option<String>,
    pub loyalty_member: bool,
    pub student: bool,
    pub local_resident: bool,
}

/// An order header to insert inside a session.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub staff_id: StaffId,
    pub payment_method: PaymentMethod,
    pub total: Money,
}

/// A committed order header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub staff_id: StaffId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

/// An order line to insert inside a session.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured at lock time; never re-read after commit.
    pub unit_price: Money,
}

/// A committed order line row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub id: Uuid,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// An order header together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithLines {
    pub header: OrderRecord,
    pub lines: Vec<OrderLineRecord>,
}
