//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{Money, ProductId, StaffId};
use sqlx::PgPool;
use store::{
    Address, NewCustomer, NewOrder, NewOrderLine, NewProduct, PaymentMethod, PostgresStore, Store,
    StoreError, StoreSession,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_store_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE order_line, orders, customer, product")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn widget(stock: u32) -> NewProduct {
    NewProduct {
        name: "Widget".to_string(),
        description: "A widget".to_string(),
        unit_price: Money::from_cents(1000),
        stock_quantity: stock,
        category: "tools".to_string(),
        locally_made: true,
        image_path: "widget.png".to_string(),
    }
}

fn customer(email: &str) -> NewCustomer {
    NewCustomer {
        name: "Ana".to_string(),
        email: email.to_string(),
        credential_hash: "hash".to_string(),
        address: Address {
            street: "Rua A".to_string(),
            number: "12".to_string(),
            complement: None,
            postal_code: "58000-000".to_string(),
            city: "Sousa".to_string(),
            state: "PB".to_string(),
        },
        phone: Some("+55 83 99999-0000".to_string()),
        loyalty_member: false,
        student: true,
        local_resident: false,
    }
}

#[tokio::test]
async fn product_crud_roundtrip() {
    let store = get_test_store().await;

    let id = store.insert_product(widget(5)).await.unwrap();
    let record = store.get_product(id).await.unwrap().unwrap();
    assert_eq!(record.name, "Widget");
    assert_eq!(record.unit_price, Money::from_cents(1000));
    assert_eq!(record.stock_quantity, 5);
    assert!(record.locally_made);

    let mut update = widget(7);
    update.name = "Widget Mk2".to_string();
    store.update_product(id, update).await.unwrap();
    let record = store.get_product(id).await.unwrap().unwrap();
    assert_eq!(record.name, "Widget Mk2");
    assert_eq!(record.stock_quantity, 7);

    assert_eq!(store.list_products().await.unwrap().len(), 1);
    assert_eq!(store.search_products("mk2").await.unwrap().len(), 1);

    let report = store.stock_report().await.unwrap();
    assert_eq!(report.distinct_products, 1);
    assert_eq!(report.total_value, Money::from_cents(7000));

    store.delete_product(id).await.unwrap();
    assert!(store.get_product(id).await.unwrap().is_none());
    assert!(matches!(
        store.delete_product(id).await.unwrap_err(),
        StoreError::ProductNotFound(_)
    ));
}

#[tokio::test]
async fn duplicate_email_maps_to_distinct_error() {
    let store = get_test_store().await;

    let id = store.insert_customer(customer("ana@example.com")).await.unwrap();
    let fetched = store.get_customer(id).await.unwrap().unwrap();
    assert!(fetched.discount_eligible());
    assert_eq!(fetched.address.city, "Sousa");

    let err = store
        .insert_customer(customer("ana@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEmail));

    let by_email = store
        .find_customer_by_email("ana@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, id);
}

#[tokio::test]
async fn session_commit_is_atomic_and_visible() {
    let store = get_test_store().await;
    let product_id = store.insert_product(widget(5)).await.unwrap();
    let customer_id = store.insert_customer(customer("buyer@example.com")).await.unwrap();

    let mut session = store.begin().await.unwrap();
    let locked = session.lock_product(product_id).await.unwrap().unwrap();
    assert_eq!(locked.stock_quantity, 5);

    let order_id = session
        .insert_order(NewOrder {
            customer_id,
            staff_id: StaffId::new(),
            payment_method: PaymentMethod::Boleto,
            total: locked.unit_price.multiply(3),
        })
        .await
        .unwrap();
    session
        .insert_order_line(NewOrderLine {
            order_id,
            product_id,
            quantity: 3,
            unit_price: locked.unit_price,
        })
        .await
        .unwrap();
    session.decrement_stock(product_id, 3).await.unwrap();
    session.commit().await.unwrap();

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_quantity, 2);

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.header.payment_method, PaymentMethod::Boleto);
    assert_eq!(order.header.total, Money::from_cents(3000));
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].unit_price, Money::from_cents(1000));
}

#[tokio::test]
async fn dropped_session_rolls_back() {
    let store = get_test_store().await;
    let product_id = store.insert_product(widget(5)).await.unwrap();
    let customer_id = store.insert_customer(customer("roll@example.com")).await.unwrap();

    let staged_order_id = {
        let mut session = store.begin().await.unwrap();
        session.lock_product(product_id).await.unwrap();
        let order_id = session
            .insert_order(NewOrder {
                customer_id,
                staff_id: StaffId::new(),
                payment_method: PaymentMethod::Card,
                total: Money::from_cents(4000),
            })
            .await
            .unwrap();
        session.decrement_stock(product_id, 4).await.unwrap();
        order_id
        // dropped without commit
    };

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_quantity, 5);
    assert!(store.get_order(staged_order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn for_update_lock_times_out_for_second_locker() {
    let store = get_test_store().await.with_lock_wait(Duration::from_millis(200));
    let product_id = store.insert_product(widget(5)).await.unwrap();

    let mut holder = store.begin().await.unwrap();
    holder.lock_product(product_id).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter.lock_product(product_id).await.unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout));

    drop(holder);
}

#[tokio::test]
async fn check_constraint_rejects_stock_underflow() {
    let store = get_test_store().await;
    let product_id = store.insert_product(widget(2)).await.unwrap();

    let mut session = store.begin().await.unwrap();
    session.lock_product(product_id).await.unwrap();
    let err = session.decrement_stock(product_id, 3).await.unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation(_)));
    drop(session);

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_quantity, 2);
}

#[tokio::test]
async fn lock_on_missing_product_returns_none() {
    let store = get_test_store().await;
    let mut session = store.begin().await.unwrap();
    assert!(session.lock_product(ProductId::new()).await.unwrap().is_none());
}
