//! Shared types for the store backend.
//!
//! Typed UUID wrappers for the entities that cross crate boundaries, plus
//! the fixed-point [`Money`] type used for all currency amounts.

pub mod ids;
pub mod money;

pub use ids::{CustomerId, OrderId, ProductId, StaffId};
pub use money::Money;
