use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    records::{
        CustomerRecord, NewCustomer, NewOrder, NewOrderLine, NewProduct, OrderLineRecord,
        OrderRecord, OrderWithLines, PaymentStatus, ProductRecord,
    },
    store::{LockedProduct, StockReport, Store, StoreSession},
};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

struct ProductSlot {
    record: ProductRecord,
    /// The per-row exclusive lock. Sessions hold the guard from
    /// `lock_product` until they end.
    row_lock: Arc<Mutex<()>>,
}

#[derive(Default)]
struct Inner {
    products: HashMap<ProductId, ProductSlot>,
    customers: HashMap<CustomerId, CustomerRecord>,
    orders: HashMap<OrderId, OrderRecord>,
    order_lines: Vec<OrderLineRecord>,
}

/// In-memory store implementation.
///
/// Backs unit and integration tests and the default server wiring. Provides
/// the same session semantics as the PostgreSQL backend: exclusive per-row
/// product locks with a bounded wait, and all-or-nothing visibility of
/// session writes.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    lock_wait: Duration,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bounded wait for row-lock acquisition.
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<InMemorySession> {
        Ok(InMemorySession {
            inner: self.inner.clone(),
            lock_wait: self.lock_wait,
            held: HashMap::new(),
            staged_orders: Vec::new(),
            staged_lines: Vec::new(),
            staged_decrements: Vec::new(),
        })
    }

    async fn insert_product(&self, product: NewProduct) -> Result<ProductId> {
        let id = ProductId::new();
        let record = ProductRecord {
            id,
            name: product.name,
            description: product.description,
            unit_price: product.unit_price,
            stock_quantity: product.stock_quantity,
            category: product.category,
            locally_made: product.locally_made,
            image_path: product.image_path,
        };
        let mut inner = self.inner.write().await;
        inner.products.insert(
            id,
            ProductSlot {
                record,
                row_lock: Arc::new(Mutex::new(())),
            },
        );
        Ok(id)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.products.get(&id).map(|slot| slot.record.clone()))
    }

    async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        let inner = self.inner.read().await;
        let mut products: Vec<_> = inner
            .products
            .values()
            .map(|slot| slot.record.clone())
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn search_products(&self, name: &str) -> Result<Vec<ProductRecord>> {
        let needle = name.to_lowercase();
        let inner = self.inner.read().await;
        let mut products: Vec<_> = inner
            .products
            .values()
            .filter(|slot| slot.record.name.to_lowercase().contains(&needle))
            .map(|slot| slot.record.clone())
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn update_product(&self, id: ProductId, product: NewProduct) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        slot.record = ProductRecord {
            id,
            name: product.name,
            description: product.description,
            unit_price: product.unit_price,
            stock_quantity: product.stock_quantity,
            category: product.category,
            locally_made: product.locally_made,
            image_path: product.image_path,
        };
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::ProductNotFound(id))
    }

    async fn stock_report(&self) -> Result<StockReport> {
        let inner = self.inner.read().await;
        let mut total_value = Money::zero();
        for slot in inner.products.values() {
            total_value += slot.record.unit_price.multiply(slot.record.stock_quantity);
        }
        Ok(StockReport {
            distinct_products: inner.products.len() as u64,
            total_value,
        })
    }

    async fn insert_customer(&self, customer: NewCustomer) -> Result<CustomerId> {
        let mut inner = self.inner.write().await;
        if inner
            .customers
            .values()
            .any(|c| c.email == customer.email)
        {
            return Err(StoreError::DuplicateEmail);
        }
        let id = CustomerId::new();
        inner.customers.insert(
            id,
            CustomerRecord {
                id,
                name: customer.name,
                email: customer.email,
                credential_hash: customer.credential_hash,
                address: customer.address,
                phone: customer.phone,
                loyalty_member: customer.loyalty_member,
                student: customer.student,
                local_resident: customer.local_resident,
            },
        );
        Ok(id)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<CustomerRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.customers.get(&id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<CustomerRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.customers.values().find(|c| c.email == email).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithLines>> {
        let inner = self.inner.read().await;
        let Some(header) = inner.orders.get(&id).cloned() else {
            return Ok(None);
        };
        let lines = inner
            .order_lines
            .iter()
            .filter(|line| line.order_id == id)
            .cloned()
            .collect();
        Ok(Some(OrderWithLines { header, lines }))
    }
}

/// One in-memory unit of work.
///
/// Writes are staged in the session and only reach the shared state on
/// [`commit`](StoreSession::commit); dropping the session discards them
/// and releases every held row lock.
pub struct InMemorySession {
    inner: Arc<RwLock<Inner>>,
    lock_wait: Duration,
    held: HashMap<ProductId, OwnedMutexGuard<()>>,
    staged_orders: Vec<OrderRecord>,
    staged_lines: Vec<OrderLineRecord>,
    staged_decrements: Vec<(ProductId, u32)>,
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<LockedProduct>> {
        if !self.held.contains_key(&id) {
            let row_lock = {
                let inner = self.inner.read().await;
                match inner.products.get(&id) {
                    Some(slot) => slot.row_lock.clone(),
                    None => return Ok(None),
                }
            };
            let guard = tokio::time::timeout(self.lock_wait, row_lock.lock_owned())
                .await
                .map_err(|_| {
                    tracing::warn!(product_id = %id, "row lock wait timed out");
                    StoreError::LockTimeout
                })?;
            self.held.insert(id, guard);
        }

        let inner = self.inner.read().await;
        Ok(inner.products.get(&id).map(|slot| LockedProduct {
            name: slot.record.name.clone(),
            unit_price: slot.record.unit_price,
            stock_quantity: slot.record.stock_quantity,
        }))
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderId> {
        let id = OrderId::new();
        self.staged_orders.push(OrderRecord {
            id,
            customer_id: order.customer_id,
            staff_id: order.staff_id,
            payment_method: order.payment_method,
            payment_status: PaymentStatus::Approved,
            total: order.total,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn insert_order_line(&mut self, line: NewOrderLine) -> Result<()> {
        self.staged_lines.push(OrderLineRecord {
            id: Uuid::new_v4(),
            order_id: line.order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        debug_assert!(self.held.contains_key(&id), "decrement without row lock");
        self.staged_decrements.push((id, quantity));
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Validate every staged decrement before applying any, so a commit
        // either lands whole or not at all. Mirrors the CHECK constraint
        // the PostgreSQL backend relies on.
        let mut projected: HashMap<ProductId, u32> = HashMap::new();
        for (id, quantity) in &self.staged_decrements {
            let current = match projected.get(id) {
                Some(stock) => *stock,
                None => {
                    inner
                        .products
                        .get(id)
                        .ok_or(StoreError::ProductNotFound(*id))?
                        .record
                        .stock_quantity
                }
            };
            let next = current.checked_sub(*quantity).ok_or_else(|| {
                StoreError::ConstraintViolation("product_stock_quantity_check".to_string())
            })?;
            projected.insert(*id, next);
        }

        for (id, stock) in projected {
            if let Some(slot) = inner.products.get_mut(&id) {
                slot.record.stock_quantity = stock;
            }
        }
        for order in self.staged_orders.drain(..) {
            inner.orders.insert(order.id, order);
        }
        inner.order_lines.append(&mut self.staged_lines);

        drop(inner);
        // Row locks release when `self.held` drops, after the writes are
        // visible to the next lock holder.
        Ok(())
    }
}
