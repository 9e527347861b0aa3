use chrono::{DateTime, Datelike, Duration, Utc};
use log::{error, warn};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::settings::{QuotaConfig, StoreErrorPolicy};
use crate::db::stores::{PlanStore, UsageLedger};
use crate::error::{AppError, AppResult};
use crate::models::plan::{PlanStatus, PlanSummary, PlanTier, UserPlan};
use crate::models::usage::{NewUsageRecord, UsageRecord};

/// Quota parameters the engine decides with. The free-tier rule is a
/// trailing window over the usage ledger; `on_store_error` pins what
/// `authorize` does when a store cannot be reached.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub free_limit: i64,
    pub free_window: Duration,
    pub on_store_error: StoreErrorPolicy,
}

impl QuotaPolicy {
    pub fn from_config(config: &QuotaConfig) -> Self {
        Self {
            free_limit: config.free_tier_limit,
            free_window: Duration::hours(config.free_tier_window_hours),
            on_store_error: config.on_store_error,
        }
    }
}

/// Outcome of an eligibility check. `remaining = None` means unlimited.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub tier: PlanTier,
    pub remaining: Option<i64>,
    pub status: PlanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

/// What a completed generation hands to `commit`: the endpoint tag for the
/// ledger and the payload to store alongside it.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub endpoint: String,
    pub content: Option<serde_json::Value>,
}

/// Per-tier decision rule. One place dispatches on tier; the three tiers
/// share the `Decision` contract and differ only here.
#[derive(Debug, Clone, Copy)]
enum TierRule {
    Unlimited,
    StoredCredits,
    TrailingWindow { limit: i64, window: Duration },
}

/// Single authority for "may this user consume one AI generation, and if so,
/// commit the consumption". `authorize` is the read-only eligibility check;
/// `commit` is the durable side-effecting step, called only after a
/// successful generation so a failed AI call never costs a credit.
pub struct AccountingEngine {
    plans: Arc<dyn PlanStore>,
    ledger: Arc<dyn UsageLedger>,
    policy: QuotaPolicy,
}

impl AccountingEngine {
    pub fn new(plans: Arc<dyn PlanStore>, ledger: Arc<dyn UsageLedger>, policy: QuotaPolicy) -> Self {
        Self {
            plans,
            ledger,
            policy,
        }
    }

    fn rule_for(&self, tier: PlanTier) -> TierRule {
        match tier {
            PlanTier::Pro => TierRule::Unlimited,
            PlanTier::Usage => TierRule::StoredCredits,
            PlanTier::Free => TierRule::TrailingWindow {
                limit: self.policy.free_limit,
                window: self.policy.free_window,
            },
        }
    }

    /// Read-only eligibility check. First touch materializes the default
    /// free plan; repeated calls never change credits or the ledger.
    pub async fn authorize(&self, user_id: &Uuid) -> AppResult<Decision> {
        let plan = match self.load_or_provision(user_id).await {
            Ok(plan) => plan,
            Err(e) => return self.resolve_store_failure(user_id, e),
        };

        match self.rule_for(plan.tier) {
            TierRule::Unlimited => Ok(Decision {
                allowed: true,
                tier: plan.tier,
                remaining: None,
                status: PlanStatus::Active,
                reset_at: None,
            }),
            TierRule::StoredCredits => {
                let credits = plan.credits.unwrap_or(0);
                Ok(Decision {
                    allowed: credits > 0,
                    tier: plan.tier,
                    remaining: Some(credits),
                    status: if credits > 0 {
                        PlanStatus::Active
                    } else {
                        PlanStatus::Expired
                    },
                    reset_at: None,
                })
            }
            TierRule::TrailingWindow { limit, window } => {
                let now = Utc::now();
                let count = match self.ledger.count_since(user_id, now - window).await {
                    Ok(count) => count,
                    Err(e) => return self.resolve_store_failure(user_id, e),
                };
                Ok(Decision {
                    allowed: count < limit,
                    tier: plan.tier,
                    remaining: Some((limit - count).max(0)),
                    status: PlanStatus::Trial,
                    reset_at: Some(now + window),
                })
            }
        }
    }

    /// Records consumption after a successful generation. The credit
    /// decrement goes through the store's atomic upsert; the ledger append
    /// is an independent write. Neither failure is surfaced to the caller,
    /// since the AI result has already been paid for. A failed decrement is
    /// an accounting discrepancy and is logged for reconciliation.
    pub async fn commit(&self, user_id: &Uuid, outcome: GenerationOutcome) {
        let decrement = |plan: &mut UserPlan| {
            if plan.tier == PlanTier::Usage {
                let current = plan.credits.unwrap_or(0);
                plan.credits = Some((current - 1).max(0));
            }
        };
        if let Err(e) = self.plans.upsert(user_id, &decrement).await {
            error!(
                "Credit decrement failed for user {}; reconciliation required: {}",
                user_id, e
            );
        }

        let record = NewUsageRecord {
            user_id: *user_id,
            endpoint: outcome.endpoint,
            generated_content: outcome.content,
            created_at: Utc::now(),
        };
        if let Err(e) = self.ledger.append(record).await {
            warn!("Usage ledger append failed for user {}: {}", user_id, e);
        }
    }

    /// Recent activity for display. Not part of any accounting decision.
    pub async fn recent_usage(&self, user_id: &Uuid, limit: i64) -> AppResult<Vec<UsageRecord>> {
        self.ledger.list_recent(user_id, limit).await
    }

    /// Full plan snapshot for the plan summary endpoint: stored plan plus
    /// ledger-derived totals.
    pub async fn summary(&self, user_id: &Uuid) -> AppResult<PlanSummary> {
        let plan = self.load_or_provision(user_id).await?;
        let total_requests = self.ledger.count_total(user_id).await?;
        let requests_this_month = self
            .ledger
            .count_since(user_id, start_of_month(Utc::now()))
            .await?;
        let recent_requests = self.ledger.list_recent(user_id, 10).await?;

        let plan_status = match plan.tier {
            PlanTier::Free => PlanStatus::Trial,
            PlanTier::Usage => {
                if plan.credits.unwrap_or(0) > 0 {
                    PlanStatus::Active
                } else {
                    PlanStatus::Expired
                }
            }
            PlanTier::Pro => PlanStatus::Active,
        };

        Ok(PlanSummary {
            plan_type: plan.tier,
            usage_credits: plan.credits,
            total_requests,
            requests_this_month,
            plan_status,
            recent_requests,
        })
    }

    async fn load_or_provision(&self, user_id: &Uuid) -> AppResult<UserPlan> {
        if let Some(plan) = self.plans.get(user_id).await? {
            return Ok(plan);
        }
        // First touch: materialize the default free plan with an identity
        // mutation. Nothing else changes on repeat calls.
        self.plans.upsert(user_id, &|_| {}).await
    }

    fn resolve_store_failure(&self, user_id: &Uuid, cause: AppError) -> AppResult<Decision> {
        match self.policy.on_store_error {
            StoreErrorPolicy::Allow => {
                error!(
                    "Store unreachable during authorize for user {}; allowing per policy: {}",
                    user_id, cause
                );
                Ok(Decision {
                    allowed: true,
                    tier: PlanTier::Free,
                    remaining: Some((self.policy.free_limit - 1).max(0)),
                    status: PlanStatus::Trial,
                    reset_at: None,
                })
            }
            StoreErrorPolicy::Deny => Err(AppError::Unavailable(format!(
                "Plan or usage store unreachable: {}",
                cause
            ))),
        }
    }
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryPlanStore, MemoryUsageLedger};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn policy(limit: i64, window_hours: i64, on_store_error: StoreErrorPolicy) -> QuotaPolicy {
        QuotaPolicy {
            free_limit: limit,
            free_window: Duration::hours(window_hours),
            on_store_error,
        }
    }

    fn engine_with(
        plans: Arc<dyn PlanStore>,
        ledger: Arc<dyn UsageLedger>,
        policy: QuotaPolicy,
    ) -> AccountingEngine {
        AccountingEngine::new(plans, ledger, policy)
    }

    fn default_engine() -> (AccountingEngine, Arc<MemoryPlanStore>, Arc<MemoryUsageLedger>) {
        let plans = Arc::new(MemoryPlanStore::new());
        let ledger = Arc::new(MemoryUsageLedger::new());
        let engine = engine_with(
            plans.clone(),
            ledger.clone(),
            policy(3, 24, StoreErrorPolicy::Allow),
        );
        (engine, plans, ledger)
    }

    fn outcome() -> GenerationOutcome {
        GenerationOutcome {
            endpoint: "generate".to_string(),
            content: Some(serde_json::json!({"title": "Mug"})),
        }
    }

    async fn set_usage_credits(plans: &MemoryPlanStore, user_id: &Uuid, credits: i64) {
        plans
            .upsert(user_id, &move |plan| {
                plan.tier = PlanTier::Usage;
                plan.credits = Some(credits);
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn usage_tier_allows_exactly_credits_many_cycles() {
        let (engine, plans, _) = default_engine();
        let user_id = Uuid::new_v4();
        set_usage_credits(&plans, &user_id, 3).await;

        for expected_remaining in [3, 2, 1] {
            let decision = engine.authorize(&user_id).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, Some(expected_remaining));
            assert_eq!(decision.status, PlanStatus::Active);
            engine.commit(&user_id, outcome()).await;
        }

        let denied = engine.authorize(&user_id).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, Some(0));
        assert_eq!(denied.status, PlanStatus::Expired);
    }

    #[tokio::test]
    async fn concurrent_commits_never_drive_credits_negative() {
        let (engine, plans, ledger) = default_engine();
        let engine = Arc::new(engine);
        let user_id = Uuid::new_v4();
        set_usage_credits(&plans, &user_id, 1).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.commit(&user_id, outcome()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let plan = plans.get(&user_id).await.unwrap().unwrap();
        assert_eq!(plan.credits, Some(0));
        // Every commit still lands in the ledger
        assert_eq!(ledger.count_total(&user_id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn free_tier_counts_trailing_window() {
        let (engine, _, ledger) = default_engine();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        // Two requests inside the 24h window (limit 3)
        for hours_ago in [2, 1] {
            ledger
                .append(NewUsageRecord {
                    user_id,
                    endpoint: "generate".to_string(),
                    generated_content: None,
                    created_at: now - Duration::hours(hours_ago),
                })
                .await
                .unwrap();
        }

        let decision = engine.authorize(&user_id).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(1));
        assert_eq!(decision.status, PlanStatus::Trial);
        assert!(decision.reset_at.is_some());
    }

    #[tokio::test]
    async fn free_tier_denies_at_limit_and_recovers_after_window() {
        let plans = Arc::new(MemoryPlanStore::new());
        let ledger = Arc::new(MemoryUsageLedger::new());
        let engine = engine_with(
            plans.clone(),
            ledger.clone(),
            policy(2, 24, StoreErrorPolicy::Allow),
        );
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        // Both slots consumed recently: denied
        for hours_ago in [2, 1] {
            ledger
                .append(NewUsageRecord {
                    user_id,
                    endpoint: "generate".to_string(),
                    generated_content: None,
                    created_at: now - Duration::hours(hours_ago),
                })
                .await
                .unwrap();
        }
        let denied = engine.authorize(&user_id).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, Some(0));

        // A day later the same records fall outside the window
        let stale_ledger = Arc::new(MemoryUsageLedger::new());
        for hours_ago in [26, 25] {
            stale_ledger
                .append(NewUsageRecord {
                    user_id,
                    endpoint: "generate".to_string(),
                    generated_content: None,
                    created_at: now - Duration::hours(hours_ago),
                })
                .await
                .unwrap();
        }
        let recovered = engine_with(plans, stale_ledger, policy(2, 24, StoreErrorPolicy::Allow))
            .authorize(&user_id)
            .await
            .unwrap();
        assert!(recovered.allowed);
        assert_eq!(recovered.remaining, Some(2));
    }

    #[tokio::test]
    async fn fresh_free_user_decrements_through_commit() {
        let plans = Arc::new(MemoryPlanStore::new());
        let ledger = Arc::new(MemoryUsageLedger::new());
        let engine = engine_with(
            plans.clone(),
            ledger.clone(),
            policy(2, 24, StoreErrorPolicy::Allow),
        );
        let user_id = Uuid::new_v4();

        let first = engine.authorize(&user_id).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, Some(2));

        engine.commit(&user_id, outcome()).await;

        let second = engine.authorize(&user_id).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, Some(1));
    }

    #[tokio::test]
    async fn authorize_never_mutates_state() {
        let (engine, plans, ledger) = default_engine();
        let user_id = Uuid::new_v4();

        for _ in 0..5 {
            engine.authorize(&user_id).await.unwrap();
        }

        let plan = plans.get(&user_id).await.unwrap().unwrap();
        assert_eq!(plan.tier, PlanTier::Free);
        assert_eq!(plan.credits, Some(0));
        assert_eq!(ledger.count_total(&user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pro_tier_is_unlimited_and_never_debited() {
        let (engine, plans, ledger) = default_engine();
        let user_id = Uuid::new_v4();
        plans
            .upsert(&user_id, &|plan| {
                plan.tier = PlanTier::Pro;
                plan.credits = None;
            })
            .await
            .unwrap();

        for _ in 0..4 {
            let decision = engine.authorize(&user_id).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, None);
            assert_eq!(decision.status, PlanStatus::Active);
            engine.commit(&user_id, outcome()).await;
        }

        let plan = plans.get(&user_id).await.unwrap().unwrap();
        assert_eq!(plan.credits, None);
        assert_eq!(ledger.count_total(&user_id).await.unwrap(), 4);
    }

    struct FailingPlanStore;

    #[async_trait]
    impl PlanStore for FailingPlanStore {
        async fn get(&self, _user_id: &Uuid) -> AppResult<Option<UserPlan>> {
            Err(AppError::Database("connection refused".to_string()))
        }

        async fn upsert(
            &self,
            _user_id: &Uuid,
            _mutate: &(dyn for<'a> Fn(&'a mut UserPlan) + Send + Sync),
        ) -> AppResult<UserPlan> {
            Err(AppError::Database("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failure_fails_open_when_configured_to_allow() {
        let engine = engine_with(
            Arc::new(FailingPlanStore),
            Arc::new(MemoryUsageLedger::new()),
            policy(3, 24, StoreErrorPolicy::Allow),
        );

        let decision = engine.authorize(&Uuid::new_v4()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(2));
    }

    #[tokio::test]
    async fn store_failure_fails_closed_when_configured_to_deny() {
        let engine = engine_with(
            Arc::new(FailingPlanStore),
            Arc::new(MemoryUsageLedger::new()),
            policy(3, 24, StoreErrorPolicy::Deny),
        );

        let err = engine.authorize(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn summary_combines_plan_and_ledger_totals() {
        let (engine, plans, _) = default_engine();
        let user_id = Uuid::new_v4();
        set_usage_credits(&plans, &user_id, 5).await;

        engine.commit(&user_id, outcome()).await;
        engine.commit(&user_id, outcome()).await;

        let summary = engine.summary(&user_id).await.unwrap();
        assert_eq!(summary.plan_type, PlanTier::Usage);
        assert_eq!(summary.usage_credits, Some(3));
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.plan_status, PlanStatus::Active);
        assert_eq!(summary.recent_requests.len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// However many commits land, stored credits floor at zero.
        #[test]
        fn credits_floor_at_zero(initial in 0i64..40, commits in 0usize..50) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (engine, plans, _) = default_engine();
                let user_id = Uuid::new_v4();
                set_usage_credits(&plans, &user_id, initial).await;

                for _ in 0..commits {
                    engine.commit(&user_id, outcome()).await;
                }

                let plan = plans.get(&user_id).await.unwrap().unwrap();
                assert_eq!(plan.credits, Some((initial - commits as i64).max(0)));
            });
        }
    }
}
