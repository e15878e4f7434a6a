//! Order placement.
//!
//! Checks a cart out against shared, finite inventory under concurrent
//! access, keeping the order total, its lines, and the stock counts
//! mutually consistent.

use std::collections::HashMap;

use common::{CustomerId, Money, OrderId, ProductId, StaffId};
use store::{LockedProduct, NewOrder, NewOrderLine, PaymentMethod, Store, StoreSession};

use crate::cart::Cart;
use crate::error::CheckoutError;

/// Input for one order placement.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer_id: CustomerId,
    /// Handling staff member; the system default when the channel is
    /// customer self-checkout.
    pub staff_id: StaffId,
    pub payment_method: PaymentMethod,
    pub cart: Cart,
}

/// Orchestrates order placement as a single atomic unit of work.
///
/// Per placement: lock every cart product in ascending product-id order,
/// check sufficiency, price the cart from the locked snapshots, persist
/// the header and lines, decrement stock, commit. Any failure after the
/// session opens drops it, which rolls everything back — no header, no
/// lines, no stock change survive a failed attempt.
pub struct CheckoutService<S: Store> {
    store: S,
}

impl<S: Store> CheckoutService<S> {
    /// Creates a new checkout service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Places an order, returning its id.
    ///
    /// Serializable with respect to other placements on overlapping
    /// products: the ascending lock order rules out circular waits, and a
    /// bounded lock wait surfaces as [`CheckoutError::Busy`].
    #[tracing::instrument(skip(self, order), fields(customer_id = %order.customer_id))]
    pub async fn place_order(&self, order: PlaceOrder) -> Result<OrderId, CheckoutError> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let start = std::time::Instant::now();

        let result = self.run_placement(order).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(order_id) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(%order_id, "order placed");
            }
            Err(e) => tracing::info!(error = %e, "checkout failed"),
        }
        result
    }

    async fn run_placement(&self, order: PlaceOrder) -> Result<OrderId, CheckoutError> {
        let mut session = self.store.begin().await?;

        // Lock and check every entry first. Ascending product-id order,
        // globally, so two placements sharing products can never hold
        // locks the other one is waiting for.
        //
        // Duplicate entries stay independent lines, but sufficiency is
        // checked against the cumulative demand within this cart; the
        // committed stock can never go negative.
        let mut locked: HashMap<ProductId, LockedProduct> = HashMap::new();
        let mut demanded: HashMap<ProductId, u32> = HashMap::new();
        for entry in order.cart.entries_in_lock_order() {
            let product = match session.lock_product(entry.product_id).await? {
                Some(product) => product,
                None => return Err(CheckoutError::ProductNotFound(entry.product_id)),
            };

            let already = demanded.get(&entry.product_id).copied().unwrap_or(0);
            if u64::from(already) + u64::from(entry.quantity)
                > u64::from(product.stock_quantity)
            {
                return Err(CheckoutError::InsufficientStock {
                    product_name: product.name,
                });
            }
            demanded.insert(entry.product_id, already + entry.quantity);
            locked.insert(entry.product_id, product);
        }

        // Price the cart from the locked snapshots. Later price edits,
        // even ones queued behind our locks, never touch this order.
        let mut total = Money::zero();
        for entry in order.cart.entries() {
            total += locked[&entry.product_id].unit_price.multiply(entry.quantity);
        }

        let order_id = session
            .insert_order(NewOrder {
                customer_id: order.customer_id,
                staff_id: order.staff_id,
                payment_method: order.payment_method,
                total,
            })
            .await?;

        // One line per cart entry, in submission order, each carrying the
        // snapshotted unit price.
        for entry in order.cart.entries() {
            session
                .insert_order_line(NewOrderLine {
                    order_id,
                    product_id: entry.product_id,
                    quantity: entry.quantity,
                    unit_price: locked[&entry.product_id].unit_price,
                })
                .await?;
            session.decrement_stock(entry.product_id, entry.quantity).await?;
        }

        session.commit().await?;
        Ok(order_id)
    }
}
