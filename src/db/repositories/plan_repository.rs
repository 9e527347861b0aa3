use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::stores::PlanStore;
use crate::error::{AppError, AppResult};
use crate::models::plan::{PlanTier, UserPlan};

const PLAN_COLUMNS: &str = "id, user_id, tier, credits, created_at, updated_at";

/// Postgres-backed plan store over the `user_plans` table.
///
/// `upsert` serializes read-modify-write per user with a row lock: the
/// default row is inserted if missing, then selected `FOR UPDATE`, mutated
/// in memory, and written back inside one transaction.
#[derive(Debug)]
pub struct PlanRepository {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    user_id: Uuid,
    tier: String,
    credits: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn into_plan(self) -> AppResult<UserPlan> {
        let tier = PlanTier::parse(&self.tier)
            .map_err(|_| AppError::Database(format!("Unknown plan tier stored: {}", self.tier)))?;
        Ok(UserPlan {
            id: self.id,
            user_id: self.user_id,
            tier,
            credits: self.credits,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanStore for PlanRepository {
    async fn get(&self, user_id: &Uuid) -> AppResult<Option<UserPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM user_plans WHERE user_id = $1",
            PLAN_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch user plan: {}", e)))?;

        row.map(PlanRow::into_plan).transpose()
    }

    async fn upsert(
        &self,
        user_id: &Uuid,
        mutate: &(dyn for<'a> Fn(&'a mut UserPlan) + Send + Sync),
    ) -> AppResult<UserPlan> {
        let mut tx = self.pool.begin().await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Materialize the default free plan so the row lock below always has
        // a row to land on.
        sqlx::query(
            r#"
            INSERT INTO user_plans (id, user_id, tier, credits, created_at, updated_at)
            VALUES ($1, $2, 'free', 0, NOW(), NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to provision user plan: {}", e)))?;

        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM user_plans WHERE user_id = $1 FOR UPDATE",
            PLAN_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to lock user plan: {}", e)))?;

        let mut plan = row.into_plan()?;
        mutate(&mut plan);

        let updated = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE user_plans
            SET tier = $2, credits = $3, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(user_id)
        .bind(plan.tier.as_str())
        .bind(plan.credits)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update user plan: {}", e)))?;

        tx.commit().await
            .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))?;

        updated.into_plan()
    }
}
