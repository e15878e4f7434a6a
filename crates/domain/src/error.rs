//! Checkout error taxonomy.

use common::ProductId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A cart entry references a product that does not exist. The whole
    /// placement aborts; a cart is never partially honored.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds available stock. Carries the product
    /// name verbatim so the caller can show which item blocked checkout.
    #[error("insufficient stock for product '{product_name}'")]
    InsufficientStock { product_name: String },

    /// The submitted cart has no entries. Rejected before any transaction
    /// is opened.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart entry has a non-positive quantity. Rejected before any
    /// transaction is opened.
    #[error("invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// A row lock could not be acquired in time. The caller may retry the
    /// whole checkout; resubmission creates a new order.
    #[error("inventory is busy, retry the checkout")]
    Busy,

    /// Underlying persistence failure. Always means full rollback; the
    /// API layer logs it and never exposes internal detail.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LockTimeout => CheckoutError::Busy,
            StoreError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            other => CheckoutError::Storage(other),
        }
    }
}
