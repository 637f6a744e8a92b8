use async_trait::async_trait;
use common::{Money, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{InventoryStore, ensure_positive};
use crate::{InventoryError, Product, ReservationKey, Result};

/// PostgreSQL-backed inventory store.
///
/// Every stock mutation is a single conditional `UPDATE ... RETURNING`, so
/// row-level locking in PostgreSQL serializes concurrent changes to the
/// same product. Keyed changes also write their `stock_reservations` row in
/// the same transaction; the row's primary key serializes calls that share
/// a key.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: stock_from_db(row.try_get("stock")?),
            is_active: row.try_get("is_active")?,
        })
    }

    async fn current_stock(&self, id: ProductId) -> Result<Option<u32>> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock.map(stock_from_db))
    }

    /// Explains why a conditional decrement matched nothing.
    async fn refused_decrement(&self, id: ProductId, quantity: u32) -> Result<u32> {
        match self.current_stock(id).await? {
            None => Err(InventoryError::ProductNotFound(id)),
            Some(available) => Err(InventoryError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available,
            }),
        }
    }
}

fn stock_from_db(stock: i64) -> u32 {
    u32::try_from(stock.max(0)).unwrap_or(u32::MAX)
}

fn increase_error(id: ProductId, err: sqlx::Error) -> InventoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.constraint() == Some("products_stock_range")
    {
        return InventoryError::StockOverflow(id);
    }
    InventoryError::Database(err)
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock, is_active
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn check_stock(&self, id: ProductId) -> Result<u32> {
        self.current_stock(id)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))
    }

    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        ensure_positive(quantity)?;

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        match remaining {
            Some(remaining) => Ok(stock_from_db(remaining)),
            None => self.refused_decrement(id, quantity).await,
        }
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        ensure_positive(quantity)?;

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| increase_error(id, e))?;

        remaining
            .map(stock_from_db)
            .ok_or(InventoryError::ProductNotFound(id))
    }

    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        ensure_positive(quantity)?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_reservations (order_id, line_no, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, line_no) DO NOTHING
            "#,
        )
        .bind(key.order_id.as_uuid())
        .bind(i64::from(key.line_no))
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            let row = sqlx::query(
                "SELECT product_id, released FROM stock_reservations WHERE order_id = $1 AND line_no = $2",
            )
            .bind(key.order_id.as_uuid())
            .bind(i64::from(key.line_no))
            .fetch_one(&mut *tx)
            .await?;
            tx.rollback().await?;

            if row.try_get::<bool, _>("released")? {
                return Err(InventoryError::ReservationReleased(key));
            }
            let held_product = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
            return self.check_stock(held_product).await;
        }

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *tx)
        .await?;

        match remaining {
            Some(remaining) => {
                tx.commit().await?;
                Ok(stock_from_db(remaining))
            }
            None => {
                tx.rollback().await?;
                self.refused_decrement(id, quantity).await
            }
        }
    }

    async fn release_stock(&self, key: ReservationKey, id: ProductId) -> Result<u32> {
        let mut tx = self.pool.begin().await?;

        let tombstoned = sqlx::query(
            r#"
            INSERT INTO stock_reservations (order_id, line_no, product_id, quantity, released, released_at)
            VALUES ($1, $2, $3, 0, TRUE, NOW())
            ON CONFLICT (order_id, line_no) DO NOTHING
            "#,
        )
        .bind(key.order_id.as_uuid())
        .bind(i64::from(key.line_no))
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if tombstoned {
            tx.commit().await?;
            return self.check_stock(id).await;
        }

        let hold = sqlx::query(
            r#"
            UPDATE stock_reservations
            SET released = TRUE, released_at = NOW()
            WHERE order_id = $1 AND line_no = $2 AND NOT released
            RETURNING product_id, quantity
            "#,
        )
        .bind(key.order_id.as_uuid())
        .bind(i64::from(key.line_no))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(hold) = hold else {
            tx.rollback().await?;
            return self.check_stock(id).await;
        };
        let held_product = ProductId::from_uuid(hold.try_get::<Uuid, _>("product_id")?);
        let quantity: i64 = hold.try_get("quantity")?;

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(held_product.as_uuid())
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| increase_error(held_product, e))?;

        // Dropping `tx` on the error paths rolls the release back.
        let remaining = remaining.ok_or(InventoryError::ProductNotFound(held_product))?;
        tx.commit().await?;
        Ok(stock_from_db(remaining))
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
