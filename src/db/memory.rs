//! In-memory store backends. Same contracts as the Postgres repositories,
//! with per-key atomicity provided by the map's entry locking. Used by the
//! test suites, where the concurrency properties of the accounting engine
//! are exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::db::stores::{PaymentEventStore, PlanStore, UsageLedger};
use crate::error::AppResult;
use crate::models::plan::UserPlan;
use crate::models::usage::{NewUsageRecord, UsageRecord};

#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: DashMap<Uuid, UserPlan>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn get(&self, user_id: &Uuid) -> AppResult<Option<UserPlan>> {
        Ok(self.plans.get(user_id).map(|entry| entry.clone()))
    }

    async fn upsert(
        &self,
        user_id: &Uuid,
        mutate: &(dyn for<'a> Fn(&'a mut UserPlan) + Send + Sync),
    ) -> AppResult<UserPlan> {
        // The entry guard holds the shard lock for the whole
        // read-modify-write, which serializes concurrent upserts per user.
        let mut entry = self
            .plans
            .entry(*user_id)
            .or_insert_with(|| UserPlan::default_for(*user_id));
        mutate(entry.value_mut());
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUsageLedger {
    records: DashMap<Uuid, Vec<UsageRecord>>,
}

impl MemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLedger for MemoryUsageLedger {
    async fn append(&self, record: NewUsageRecord) -> AppResult<UsageRecord> {
        let stored = UsageRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            endpoint: record.endpoint,
            generated_content: record.generated_content,
            created_at: record.created_at,
        };
        self.records
            .entry(stored.user_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn count_since(&self, user_id: &Uuid, since: DateTime<Utc>) -> AppResult<i64> {
        Ok(self
            .records
            .get(user_id)
            .map(|entry| entry.iter().filter(|r| r.created_at >= since).count() as i64)
            .unwrap_or(0))
    }

    async fn count_total(&self, user_id: &Uuid) -> AppResult<i64> {
        Ok(self
            .records
            .get(user_id)
            .map(|entry| entry.len() as i64)
            .unwrap_or(0))
    }

    async fn list_recent(&self, user_id: &Uuid, limit: i64) -> AppResult<Vec<UsageRecord>> {
        let mut records = self
            .records
            .get(user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPaymentEvents {
    seen: DashMap<String, Uuid>,
}

impl MemoryPaymentEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentEventStore for MemoryPaymentEvents {
    async fn try_record(&self, user_id: &Uuid, reference: &str) -> AppResult<bool> {
        use dashmap::mapref::entry::Entry;

        match self.seen.entry(reference.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(*user_id);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::PlanTier;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn new_record(user_id: Uuid, created_at: DateTime<Utc>) -> NewUsageRecord {
        NewUsageRecord {
            user_id,
            endpoint: "generate".to_string(),
            generated_content: Some(serde_json::json!({"title": "Mug"})),
            created_at,
        }
    }

    #[tokio::test]
    async fn upsert_provisions_default_free_plan() {
        let store = MemoryPlanStore::new();
        let user_id = Uuid::new_v4();

        assert_eq!(store.get(&user_id).await.unwrap(), None);

        let plan = store.upsert(&user_id, &|_| {}).await.unwrap();
        assert_eq!(plan.tier, PlanTier::Free);
        assert_eq!(plan.credits, Some(0));

        let loaded = store.get(&user_id).await.unwrap().unwrap();
        assert_eq!(loaded.id, plan.id);
    }

    #[tokio::test]
    async fn upsert_applies_mutation_atomically_per_user() {
        let store = std::sync::Arc::new(MemoryPlanStore::new());
        let user_id = Uuid::new_v4();
        store
            .upsert(&user_id, &|plan| plan.credits = Some(0))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&user_id, &|plan| {
                        plan.credits = Some(plan.credits.unwrap_or(0) + 1);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let plan = store.get(&user_id).await.unwrap().unwrap();
        assert_eq!(plan.credits, Some(16));
    }

    #[tokio::test]
    async fn ledger_round_trips_records_in_descending_order() {
        let ledger = MemoryUsageLedger::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let oldest = ledger
            .append(new_record(user_id, now - Duration::hours(2)))
            .await
            .unwrap();
        let newest = ledger
            .append(new_record(user_id, now))
            .await
            .unwrap();
        let middle = ledger
            .append(new_record(user_id, now - Duration::hours(1)))
            .await
            .unwrap();

        let recent = ledger.list_recent(&user_id, 10).await.unwrap();
        assert_eq!(recent, vec![newest.clone(), middle, oldest]);
        assert_eq!(recent[0].generated_content, newest.generated_content);

        let limited = ledger.list_recent(&user_id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, newest.id);
    }

    #[tokio::test]
    async fn ledger_counts_only_records_inside_window() {
        let ledger = MemoryUsageLedger::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        ledger
            .append(new_record(user_id, now - Duration::hours(30)))
            .await
            .unwrap();
        ledger
            .append(new_record(user_id, now - Duration::hours(2)))
            .await
            .unwrap();

        let windowed = ledger
            .count_since(&user_id, now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(windowed, 1);
        assert_eq!(ledger.count_total(&user_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn payment_reference_records_only_once() {
        let events = MemoryPaymentEvents::new();
        let user_id = Uuid::new_v4();

        assert!(events.try_record(&user_id, "0xabc123").await.unwrap());
        assert!(!events.try_record(&user_id, "0xabc123").await.unwrap());
        assert!(events.try_record(&user_id, "0xdef456").await.unwrap());
    }
}
