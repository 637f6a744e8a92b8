use async_trait::async_trait;
use common::{Money, OrderId, PageRequest, PaymentId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::PaymentStore;
use crate::{Payment, PaymentStatus, Result, SettlementError, TransactionId};

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, amount_cents, currency, method, status, \
     transaction_id, provider_ref, failure_reason, paid_at, created_at, updated_at";

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let method: String = row.try_get("method")?;
        let status: String = row.try_get("status")?;
        let transaction_id: String = row.try_get("transaction_id")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            method: method.parse()?,
            status: status.parse()?,
            transaction_id: TransactionId::new(transaction_id),
            provider_ref: row.try_get("provider_ref")?,
            failure_reason: row.try_get("failure_reason")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_one_where(&self, clause: &str, value: Uuid) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE {clause} = $1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_payment).transpose()
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, user_id, amount_cents, currency, method, status,
                                  transaction_id, provider_ref, failure_reason, paid_at,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.transaction_id.as_str())
        .bind(&payment.provider_ref)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("unique_payment_order") {
                    return SettlementError::PaymentExists(payment.order_id);
                }
                if db_err.is_unique_violation() {
                    return SettlementError::ConcurrencyConflict(payment.id);
                }
            }
            SettlementError::Database(e)
        })?;
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.fetch_one_where("id", id.as_uuid()).await
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        self.fetch_one_where("order_id", order_id.as_uuid()).await
    }

    async fn get_by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1");
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_payment).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Payment>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(i64::from(page.page_size()))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let payments = rows
            .into_iter()
            .map(Self::row_to_payment)
            .collect::<Result<Vec<_>>>()?;
        Ok((payments, total.max(0) as u64))
    }

    async fn update(&self, payment: &Payment, expected: PaymentStatus) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, provider_ref = $4, failure_reason = $5, paid_at = $6, updated_at = $7
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(expected.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.provider_ref)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return match self.get(payment.id).await? {
                Some(_) => Err(SettlementError::ConcurrencyConflict(payment.id)),
                None => Err(SettlementError::PaymentNotFound(payment.id)),
            };
        }
        Ok(())
    }
}
