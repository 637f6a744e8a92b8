use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, PageRequest, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::OrderStore;
use crate::{Order, OrderError, OrderLine, OrderStatus, ReservationState, Result};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: status.parse()?,
            total: Money::from_cents(row.try_get("total_cents")?),
            lines: Vec::new(),
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        let reservation: String = row.try_get("reservation")?;
        Ok(OrderLine {
            line_no: to_u32(row.try_get::<i32, _>("line_no")?.into())?,
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            quantity: to_u32(row.try_get("quantity")?)?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            reservation: reservation.parse()?,
        })
    }

    /// Loads the lines of every given order and attaches them.
    async fn attach_lines(&self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();

        let rows = sqlx::query(
            r#"
            SELECT order_id, line_no, product_id, product_name, unit_price_cents,
                   quantity, subtotal_cents, reservation
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_line(row)?);
        }
        for order in orders.iter_mut() {
            order.lines = by_order.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(())
    }

    /// Explains why a guarded update matched no row.
    async fn missed_update(&self, id: OrderId) -> OrderError {
        match self.get(id).await {
            Ok(Some(_)) => OrderError::ConcurrencyConflict(id),
            Ok(None) => OrderError::OrderNotFound(id),
            Err(err) => err,
        }
    }
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| OrderError::Internal(format!("value out of range: {value}")))
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_cents, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total.cents())
        .bind(&order.failure_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return OrderError::ConcurrencyConflict(order.id);
            }
            OrderError::Database(e)
        })?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, product_id, product_name,
                                         unit_price_cents, quantity, subtotal_cents, reservation)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line.line_no as i32)
            .bind(line.product_id.as_uuid())
            .bind(&line.product_name)
            .bind(line.unit_price.cents())
            .bind(i64::from(line.quantity))
            .bind(line.subtotal.cents())
            .bind(line.reservation.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_cents, failure_reason, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = [Self::row_to_order(row)?];
        self.attach_lines(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<(Vec<Order>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, total_cents, failure_reason, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(i64::from(page.page_size()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.attach_lines(&mut orders).await?;

        Ok((orders, total.max(0) as u64))
    }

    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }

    async fn set_line_reservation(
        &self,
        id: OrderId,
        line_no: u32,
        state: ReservationState,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE order_lines SET reservation = $3 WHERE order_id = $1 AND line_no = $2",
        )
        .bind(id.as_uuid())
        .bind(line_no as i32)
        .bind(state.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(OrderError::Internal(format!(
                "order {id} has no line {line_no}"
            )));
        }

        sqlx::query("UPDATE orders SET updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_failed(&self, id: OrderId, reason: &str) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET failure_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(order) => Err(OrderError::NotPending {
                    status: order.status,
                }),
                None => Err(OrderError::OrderNotFound(id)),
            };
        }
        Ok(())
    }

    async fn transition(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.missed_update(id).await);
        }

        self.get(id).await?.ok_or(OrderError::OrderNotFound(id))
    }
}
