use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::stores::UsageLedger;
use crate::error::{AppError, AppResult};
use crate::models::usage::{NewUsageRecord, UsageRecord};

/// Postgres-backed usage ledger over the `ai_requests` table. Append-only;
/// the `(user_id, created_at)` index serves both the trailing-window counts
/// and the recent-history reads.
#[derive(Debug)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLedger for UsageRepository {
    async fn append(&self, record: NewUsageRecord) -> AppResult<UsageRecord> {
        let row = sqlx::query_as::<_, UsageRecord>(
            r#"
            INSERT INTO ai_requests (id, user_id, endpoint, generated_content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, endpoint, generated_content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(&record.endpoint)
        .bind(&record.generated_content)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to append usage record: {}", e)))?;

        Ok(row)
    }

    async fn count_since(&self, user_id: &Uuid, since: DateTime<Utc>) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ai_requests WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to count usage records: {}", e)))?;

        Ok(count)
    }

    async fn count_total(&self, user_id: &Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ai_requests WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to count usage records: {}", e)))?;

        Ok(count)
    }

    async fn list_recent(&self, user_id: &Uuid, limit: i64) -> AppResult<Vec<UsageRecord>> {
        let rows = sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT id, user_id, endpoint, generated_content, created_at
            FROM ai_requests
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list usage records: {}", e)))?;

        Ok(rows)
    }
}
