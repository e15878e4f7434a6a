//! Integration tests for the order placement transaction.
//!
//! These exercise the properties the placement path must hold under
//! concurrency: conservation of stock, no oversell, price-at-purchase
//! immutability, all-or-nothing commits, and deadlock freedom.

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, Money, ProductId, StaffId};
use domain::{Cart, CartEntry, CheckoutError, CheckoutService, PlaceOrder};
use store::{InMemoryStore, NewProduct, PaymentMethod, Store, StoreSession};
use tokio::task::JoinSet;

async fn seed_product(store: &InMemoryStore, name: &str, price_cents: i64, stock: u32) -> ProductId {
    store
        .insert_product(NewProduct {
            name: name.to_string(),
            description: String::new(),
            unit_price: Money::from_cents(price_cents),
            stock_quantity: stock,
            category: "test".to_string(),
            locally_made: false,
            image_path: String::new(),
        })
        .await
        .unwrap()
}

fn place(entries: Vec<CartEntry>) -> PlaceOrder {
    PlaceOrder {
        customer_id: CustomerId::new(),
        staff_id: StaffId::new(),
        payment_method: PaymentMethod::Pix,
        cart: Cart::new(entries).unwrap(),
    }
}

async fn stock_of(store: &InMemoryStore, id: ProductId) -> u32 {
    store.get_product(id).await.unwrap().unwrap().stock_quantity
}

mod atomicity {
    use super::*;

    #[tokio::test]
    async fn failure_on_a_later_line_leaves_no_partial_state() {
        let store = InMemoryStore::new();
        let service = CheckoutService::new(store.clone());

        let a = seed_product(&store, "A", 100, 10).await;
        let b = seed_product(&store, "B", 100, 10).await;
        let c = seed_product(&store, "C", 100, 1).await;
        let d = seed_product(&store, "D", 100, 10).await;

        // The third line is short on stock; the first two were already
        // locked and checked when the abort happens.
        let err = service
            .place_order(place(vec![
                CartEntry::new(a, 2),
                CartEntry::new(b, 2),
                CartEntry::new(c, 5),
                CartEntry::new(d, 2),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));

        assert_eq!(store.order_count().await, 0);
        for id in [a, b, c, d] {
            let untouched = if id == c { 1 } else { 10 };
            assert_eq!(stock_of(&store, id).await, untouched);
        }
    }

    #[tokio::test]
    async fn missing_product_aborts_the_whole_cart() {
        let store = InMemoryStore::new();
        let service = CheckoutService::new(store.clone());
        let a = seed_product(&store, "A", 100, 10).await;

        let err = service
            .place_order(place(vec![
                CartEntry::new(a, 2),
                CartEntry::new(ProductId::new(), 1),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(_)));

        assert_eq!(store.order_count().await, 0);
        assert_eq!(stock_of(&store, a).await, 10);
    }
}

mod conservation {
    use super::*;

    #[tokio::test]
    async fn stock_plus_ordered_quantities_is_conserved() {
        let store = InMemoryStore::new();
        let service = CheckoutService::new(store.clone());

        let a = seed_product(&store, "A", 250, 20).await;
        let b = seed_product(&store, "B", 990, 15).await;

        let carts = [
            vec![CartEntry::new(a, 3)],
            vec![CartEntry::new(a, 1), CartEntry::new(b, 4)],
            vec![CartEntry::new(b, 2), CartEntry::new(a, 5)],
        ];

        let mut ordered_a = 0;
        let mut ordered_b = 0;
        for cart in carts {
            for entry in &cart {
                if entry.product_id == a {
                    ordered_a += entry.quantity;
                } else {
                    ordered_b += entry.quantity;
                }
            }
            service.place_order(place(cart)).await.unwrap();
        }

        assert_eq!(stock_of(&store, a).await, 20 - ordered_a);
        assert_eq!(stock_of(&store, b).await, 15 - ordered_b);
    }
}

mod no_oversell {
    use super::*;

    #[tokio::test]
    async fn racing_checkouts_admit_exactly_what_fits() {
        let store = InMemoryStore::new();
        let service = Arc::new(CheckoutService::new(store.clone()));
        let product_id = seed_product(&store, "Limited", 100, 10).await;

        // Eight racers of 3 units against a stock of 10: only three fit.
        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let service = service.clone();
            tasks.spawn(async move {
                service
                    .place_order(place(vec![CartEntry::new(product_id, 3)]))
                    .await
            });
        }

        let mut successes = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => successes += 1,
                Err(CheckoutError::InsufficientStock { product_name }) => {
                    assert_eq!(product_name, "Limited");
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(stock_of(&store, product_id).await, 1);
    }

    #[tokio::test]
    async fn two_carts_race_for_the_last_units() {
        let store = InMemoryStore::new();
        let service = Arc::new(CheckoutService::new(store.clone()));
        let product_id = seed_product(&store, "P1", 1000, 5).await;

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .place_order(place(vec![CartEntry::new(product_id, 3)]))
                    .await
            })
        };
        let second = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .place_order(place(vec![CartEntry::new(product_id, 3)]))
                    .await
            })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(winners.len(), 1, "exactly one cart fits");

        let order_id = *winners[0].as_ref().unwrap();
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.header.total, Money::from_cents(3000));

        let loser = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loser.as_ref().unwrap_err(),
            CheckoutError::InsufficientStock { .. }
        ));

        assert_eq!(stock_of(&store, product_id).await, 2);
    }
}

mod price_snapshot {
    use super::*;

    #[tokio::test]
    async fn later_price_edits_never_touch_committed_orders() {
        let store = InMemoryStore::new();
        let service = CheckoutService::new(store.clone());
        let product_id = seed_product(&store, "Widget", 1000, 10).await;

        let order_id = service
            .place_order(place(vec![CartEntry::new(product_id, 2)]))
            .await
            .unwrap();

        store
            .update_product(
                product_id,
                NewProduct {
                    name: "Widget".to_string(),
                    description: String::new(),
                    unit_price: Money::from_cents(9999),
                    stock_quantity: 8,
                    category: "test".to_string(),
                    locally_made: false,
                    image_path: String::new(),
                },
            )
            .await
            .unwrap();

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.lines[0].unit_price, Money::from_cents(1000));
        assert_eq!(order.header.total, Money::from_cents(2000));
    }
}

mod deadlock_freedom {
    use super::*;

    #[tokio::test]
    async fn opposite_cart_orders_both_complete() {
        let store = InMemoryStore::new();
        let service = Arc::new(CheckoutService::new(store.clone()));
        let x = seed_product(&store, "X", 100, 1000).await;
        let y = seed_product(&store, "Y", 100, 1000).await;

        // Submission order differs; lock order does not. Without the
        // ascending-id discipline these two would eventually deadlock.
        let mut tasks = JoinSet::new();
        for round in 0..25 {
            let service = service.clone();
            tasks.spawn(async move {
                let entries = if round % 2 == 0 {
                    vec![CartEntry::new(x, 1), CartEntry::new(y, 1)]
                } else {
                    vec![CartEntry::new(y, 1), CartEntry::new(x, 1)]
                };
                service.place_order(place(entries)).await
            });
        }

        let all = tokio::time::timeout(Duration::from_secs(30), async {
            let mut ok = 0;
            while let Some(result) = tasks.join_next().await {
                result.unwrap().unwrap();
                ok += 1;
            }
            ok
        })
        .await
        .expect("checkouts deadlocked");

        assert_eq!(all, 25);
        assert_eq!(stock_of(&store, x).await, 1000 - 25);
        assert_eq!(stock_of(&store, y).await, 1000 - 25);
    }
}

mod bounded_wait {
    use super::*;

    #[tokio::test]
    async fn held_lock_surfaces_as_busy() {
        let store = InMemoryStore::new().with_lock_wait(Duration::from_millis(50));
        let service = CheckoutService::new(store.clone());
        let product_id = seed_product(&store, "Widget", 100, 10).await;

        // Park a competing session on the row.
        let mut holder = store.begin().await.unwrap();
        holder.lock_product(product_id).await.unwrap();

        let err = service
            .place_order(place(vec![CartEntry::new(product_id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Busy));

        drop(holder);
        // After the holder releases, the same cart goes through.
        service
            .place_order(place(vec![CartEntry::new(product_id, 1)]))
            .await
            .unwrap();
    }
}
