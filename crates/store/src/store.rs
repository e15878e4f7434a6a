use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId};

use crate::{
    Result,
    records::{
        CustomerRecord, NewCustomer, NewOrder, NewOrderLine, NewProduct, OrderWithLines,
        ProductRecord,
    },
};

/// A product row as seen under an exclusive lock.
///
/// The `unit_price` here is the price snapshot for the transaction that
/// holds the lock; it is what gets copied into the order line.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedProduct {
    pub name: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
}

/// Aggregate stock figures across the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct StockReport {
    pub distinct_products: u64,
    /// Σ unit price × stock quantity.
    pub total_value: Money,
}

/// Core trait for store backends.
///
/// A store owns the persisted catalog, customer, and order state. All
/// implementations must be thread-safe (Send + Sync); checkout runs one
/// [`StoreSession`] per request, concurrently.
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction-scoped session type for this backend.
    type Session: StoreSession;

    /// Opens a new unit of work.
    ///
    /// Everything done through the returned session is invisible to other
    /// sessions until [`StoreSession::commit`]; dropping the session
    /// without committing rolls all of it back.
    async fn begin(&self) -> Result<Self::Session>;

    // -- Catalog --

    /// Inserts a product and returns its id.
    async fn insert_product(&self, product: NewProduct) -> Result<ProductId>;

    /// Fetches one product, or None if it does not exist.
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>>;

    /// Lists all products ordered by name.
    async fn list_products(&self) -> Result<Vec<ProductRecord>>;

    /// Case-insensitive substring search over product names.
    async fn search_products(&self, name: &str) -> Result<Vec<ProductRecord>>;

    /// Replaces all fields of an existing product.
    ///
    /// Fails with [`StoreError::ProductNotFound`](crate::StoreError) if the
    /// product does not exist.
    async fn update_product(&self, id: ProductId, product: NewProduct) -> Result<()>;

    /// Deletes a product.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    /// Distinct product count and total stock valuation.
    async fn stock_report(&self) -> Result<StockReport>;

    // -- Customers --

    /// Registers a customer.
    ///
    /// Fails with [`StoreError::DuplicateEmail`](crate::StoreError) if the
    /// email is already taken.
    async fn insert_customer(&self, customer: NewCustomer) -> Result<CustomerId>;

    /// Fetches one customer by id.
    async fn get_customer(&self, id: CustomerId) -> Result<Option<CustomerRecord>>;

    /// Looks a customer up by exact email.
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<CustomerRecord>>;

    // -- Orders --

    /// Fetches a committed order header together with its lines.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithLines>>;
}

/// One transaction-scoped unit of work.
///
/// The session is the only way to read a product for update or to mutate
/// stock; `lock_product` is the sole concurrency-control primitive in the
/// system. Sessions either commit as a whole or leave no trace.
#[async_trait]
pub trait StoreSession: Send + Sized {
    /// Acquires an exclusive lock on the product row and returns its
    /// current state, or None if the product does not exist.
    ///
    /// No other session can lock or mutate the row until this session
    /// ends. Blocks for at most the backend's configured lock wait;
    /// expiry yields [`StoreError::LockTimeout`](crate::StoreError).
    /// Re-locking a row already held by this session returns immediately.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<LockedProduct>>;

    /// Inserts an order header and returns its id.
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderId>;

    /// Inserts one order line.
    async fn insert_order_line(&mut self, line: NewOrderLine) -> Result<()>;

    /// Reduces the product's stock by `quantity`.
    ///
    /// The caller must hold the row lock from [`lock_product`] and must
    /// have already validated sufficiency against it.
    ///
    /// [`lock_product`]: StoreSession::lock_product
    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Makes every write in this session durable and releases the locks.
    async fn commit(self) -> Result<()>;
}
