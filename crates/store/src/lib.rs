//! Storage layer for the store backend.
//!
//! Defines the [`Store`] and [`StoreSession`] traits — the transaction
//! boundary and the inventory-ledger contract — with two backends:
//! [`InMemoryStore`] for tests and default wiring, and [`PostgresStore`]
//! backed by sqlx. Both give sessions exclusive per-row product locks with
//! a bounded wait and all-or-nothing commit semantics.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    Address, CustomerRecord, NewCustomer, NewOrder, NewOrderLine, NewProduct, OrderLineRecord,
    OrderRecord, OrderWithLines, PaymentMethod, PaymentStatus, ProductRecord,
};
pub use store::{LockedProduct, StockReport, Store, StoreSession};
