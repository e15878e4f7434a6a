use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId, StaffId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    records::{
        CustomerRecord, NewCustomer, NewOrder, NewOrderLine, NewProduct, OrderLineRecord,
        OrderRecord, OrderWithLines, PaymentMethod, PaymentStatus, ProductRecord,
    },
    store::{LockedProduct, StockReport, Store, StoreSession},
};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// SQLSTATE for "lock not available", raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE for CHECK constraint violations.
const CHECK_VIOLATION: &str = "23514";

/// PostgreSQL-backed store implementation.
///
/// Sessions map to database transactions; `lock_product` is
/// `SELECT … FOR UPDATE` with a `lock_timeout` bound set per transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_wait: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Overrides the bounded wait for row-lock acquisition.
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: &PgRow) -> Result<ProductRecord> {
        Ok(ProductRecord {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            unit_price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: row.try_get::<i32, _>("stock_quantity")? as u32,
            category: row.try_get("category")?,
            locally_made: row.try_get("locally_made")?,
            image_path: row.try_get("image_path")?,
        })
    }

    fn row_to_customer(row: &PgRow) -> Result<CustomerRecord> {
        Ok(CustomerRecord {
            id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            credential_hash: row.try_get("credential_hash")?,
            address: crate::records::Address {
                street: row.try_get("street")?,
                number: row.try_get("street_number")?,
                complement: row.try_get("complement")?,
                postal_code: row.try_get("postal_code")?,
                city: row.try_get("city")?,
                state: row.try_get("state")?,
            },
            phone: row.try_get("phone")?,
            loyalty_member: row.try_get("loyalty_member")?,
            student: row.try_get("student")?,
            local_resident: row.try_get("local_resident")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<OrderRecord> {
        let method: String = row.try_get("payment_method")?;
        let status: String = row.try_get("payment_status")?;
        Ok(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            staff_id: StaffId::from_uuid(row.try_get::<Uuid, _>("staff_id")?),
            payment_method: PaymentMethod::parse(&method)
                .ok_or_else(|| decode_error("payment_method", &method))?,
            payment_status: PaymentStatus::parse(&status)
                .ok_or_else(|| decode_error("payment_status", &status))?,
            total: Money::from_cents(row.try_get("total_cents")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

fn decode_error(column: &str, value: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(
        format!("unexpected {column} value: {value}").into(),
    ))
}

/// Maps database errors to the store taxonomy.
///
/// Lock-timeout expiry and constraint violations get their own variants;
/// everything else stays a generic database error.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            tracing::warn!("row lock wait timed out");
            return StoreError::LockTimeout;
        }
        if db_err.is_unique_violation() && db_err.constraint() == Some("customer_email_key") {
            return StoreError::DuplicateEmail;
        }
        if db_err.code().as_deref() == Some(CHECK_VIOLATION) {
            return StoreError::ConstraintViolation(
                db_err.constraint().unwrap_or("check").to_string(),
            );
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PostgresStore {
    type Session = PostgresSession;

    async fn begin(&self) -> Result<PostgresSession> {
        let mut tx = self.pool.begin().await?;
        // SET LOCAL scopes the bound to this transaction only. The value
        // cannot be a bind parameter.
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_wait.as_millis());
        sqlx::query(&stmt).execute(&mut *tx).await?;
        Ok(PostgresSession { tx })
    }

    async fn insert_product(&self, product: NewProduct) -> Result<ProductId> {
        let id = ProductId::new();
        sqlx::query(
            r#"
            INSERT INTO product (id, name, description, price_cents, stock_quantity, category, locally_made, image_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(product.stock_quantity as i32)
        .bind(&product.category)
        .bind(product.locally_made)
        .bind(&product.image_path)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(id)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query("SELECT * FROM product WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        let rows = sqlx::query("SELECT * FROM product ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_product).collect()
    }

    async fn search_products(&self, name: &str) -> Result<Vec<ProductRecord>> {
        let rows = sqlx::query("SELECT * FROM product WHERE name ILIKE $1 ORDER BY name")
            .bind(format!("%{name}%"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_product).collect()
    }

    async fn update_product(&self, id: ProductId, product: NewProduct) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE product
            SET name = $2, description = $3, price_cents = $4, stock_quantity = $5,
                category = $6, locally_made = $7, image_path = $8
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(product.stock_quantity as i32)
        .bind(&product.category)
        .bind(product.locally_made)
        .bind(&product.image_path)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn stock_report(&self) -> Result<StockReport> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS distinct_products,
                   COALESCE(SUM(price_cents * stock_quantity), 0)::BIGINT AS total_value_cents
            FROM product
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StockReport {
            distinct_products: row.try_get::<i64, _>("distinct_products")? as u64,
            total_value: Money::from_cents(row.try_get("total_value_cents")?),
        })
    }

    async fn insert_customer(&self, customer: NewCustomer) -> Result<CustomerId> {
        let id = CustomerId::new();
        sqlx::query(
            r#"
            INSERT INTO customer (id, name, email, credential_hash, street, street_number,
                                  complement, postal_code, city, state, phone,
                                  loyalty_member, student, local_resident)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.credential_hash)
        .bind(&customer.address.street)
        .bind(&customer.address.number)
        .bind(&customer.address.complement)
        .bind(&customer.address.postal_code)
        .bind(&customer.address.city)
        .bind(&customer.address.state)
        .bind(&customer.phone)
        .bind(customer.loyalty_member)
        .bind(customer.student)
        .bind(customer.local_resident)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(id)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<CustomerRecord>> {
        let row = sqlx::query("SELECT * FROM customer WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_customer).transpose()
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<CustomerRecord>> {
        let row = sqlx::query("SELECT * FROM customer WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_customer).transpose()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithLines>> {
        let Some(header_row) = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let header = Self::row_to_order(&header_row)?;

        let line_rows = sqlx::query("SELECT * FROM order_line WHERE order_id = $1")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let lines = line_rows
            .iter()
            .map(|row| {
                Ok(OrderLineRecord {
                    id: row.try_get("id")?,
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(OrderWithLines { header, lines }))
    }
}

/// One PostgreSQL unit of work.
///
/// Wraps a database transaction; sqlx rolls it back when the session is
/// dropped without commit.
pub struct PostgresSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreSession for PostgresSession {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<LockedProduct>> {
        let row = sqlx::query(
            "SELECT name, price_cents, stock_quantity FROM product WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        row.map(|row| {
            Ok(LockedProduct {
                name: row.try_get("name")?,
                unit_price: Money::from_cents(row.try_get("price_cents")?),
                stock_quantity: row.try_get::<i32, _>("stock_quantity")? as u32,
            })
        })
        .transpose()
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderId> {
        let id = OrderId::new();
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, staff_id, payment_method, payment_status, total_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.staff_id.as_uuid())
        .bind(order.payment_method.as_str())
        .bind(PaymentStatus::Approved.as_str())
        .bind(order.total.cents())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(id)
    }

    async fn insert_order_line(&mut self, line: NewOrderLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_line (id, order_id, product_id, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(line.order_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(line.quantity as i32)
        .bind(line.unit_price.cents())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE product SET stock_quantity = stock_quantity - $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(quantity as i32)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}
