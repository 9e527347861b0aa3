use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::stores::PaymentEventStore;
use crate::error::{AppError, AppResult};

/// Postgres-backed record of processed payment confirmations over the
/// `payment_events` table. The unique constraint on `payment_ref` is what
/// makes `try_record` an atomic insert-if-absent.
#[derive(Debug)]
pub struct PaymentEventRepository {
    pool: PgPool,
}

impl PaymentEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentEventStore for PaymentEventRepository {
    async fn try_record(&self, user_id: &Uuid, reference: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (id, user_id, payment_ref, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (payment_ref) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to record payment event: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
