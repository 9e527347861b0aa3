use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::plan::UserPlan;
use crate::models::usage::{NewUsageRecord, UsageRecord};

/// Durable record of each user's plan tier and remaining credits.
///
/// `upsert` is the only write path: the store loads the current row (or the
/// default free plan when the user has none), applies the mutation, and
/// writes the result back, with the whole read-modify-write cycle serialized
/// per user. Callers must never read a plan and then write it in a separate
/// operation.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get(&self, user_id: &Uuid) -> AppResult<Option<UserPlan>>;

    async fn upsert(
        &self,
        user_id: &Uuid,
        mutate: &(dyn for<'a> Fn(&'a mut UserPlan) + Send + Sync),
    ) -> AppResult<UserPlan>;
}

/// Append-only record of metered requests. Records are immutable once
/// written; `count_since` and `list_recent` rely on stable `created_at`
/// ordering.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn append(&self, record: NewUsageRecord) -> AppResult<UsageRecord>;

    async fn count_since(&self, user_id: &Uuid, since: DateTime<Utc>) -> AppResult<i64>;

    async fn count_total(&self, user_id: &Uuid) -> AppResult<i64>;

    /// Most recent records first. Feeds the activity display, not accounting.
    async fn list_recent(&self, user_id: &Uuid, limit: i64) -> AppResult<Vec<UsageRecord>>;
}

/// Processed payment confirmations, keyed by the payment reference supplied
/// with an upgrade. A reference can be recorded at most once, which is what
/// makes replayed confirmations a no-op.
#[async_trait]
pub trait PaymentEventStore: Send + Sync {
    /// Returns false when the reference was already recorded.
    async fn try_record(&self, user_id: &Uuid, reference: &str) -> AppResult<bool>;
}
