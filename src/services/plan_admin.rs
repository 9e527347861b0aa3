use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::stores::{PaymentEventStore, PlanStore};
use crate::error::{AppError, AppResult};
use crate::models::plan::{PlanTier, UserPlan};

/// Opaque, already-verified payment confirmation supplied by the payment
/// flow. The engine never inspects or validates the transaction itself; the
/// unique reference is what guards against replays.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub reference: String,
    pub amount: Option<serde_json::Value>,
}

/// Applies plan changes triggered by confirmed payments. Writes go through
/// the plan store's atomic upsert so a top-up racing a debit cannot lose
/// either update.
pub struct PlanAdminService {
    plans: Arc<dyn PlanStore>,
    payments: Arc<dyn PaymentEventStore>,
}

impl PlanAdminService {
    pub fn new(plans: Arc<dyn PlanStore>, payments: Arc<dyn PaymentEventStore>) -> Self {
        Self { plans, payments }
    }

    /// Upgrade a user to `pro` (unlimited, overwrites) or `usage`
    /// (prepaid credits, accumulates). A replayed payment reference is a
    /// no-op returning the current plan.
    pub async fn upgrade(
        &self,
        user_id: &Uuid,
        target: PlanTier,
        granted_credits: Option<i64>,
        payment: PaymentConfirmation,
    ) -> AppResult<UserPlan> {
        if target == PlanTier::Free {
            return Err(AppError::InvalidArgument("Invalid plan type".to_string()));
        }

        let granted = match target {
            PlanTier::Usage => {
                let granted = granted_credits.ok_or_else(|| {
                    AppError::InvalidArgument(
                        "usageCredits is required for the usage plan".to_string(),
                    )
                })?;
                if granted <= 0 {
                    return Err(AppError::InvalidArgument(
                        "usageCredits must be a positive number".to_string(),
                    ));
                }
                granted
            }
            _ => 0,
        };

        let reference = payment.reference.trim().to_string();
        if reference.is_empty() {
            return Err(AppError::InvalidArgument(
                "transactionHash is required".to_string(),
            ));
        }

        if !self.payments.try_record(user_id, &reference).await? {
            warn!(
                "Duplicate payment confirmation {} for user {}; upgrade skipped",
                reference, user_id
            );
            return self.plans.upsert(user_id, &|_| {}).await;
        }

        let apply = move |plan: &mut UserPlan| match target {
            PlanTier::Pro => {
                plan.tier = PlanTier::Pro;
                plan.credits = None;
            }
            PlanTier::Usage => {
                plan.tier = PlanTier::Usage;
                // A plan arriving from pro has no counter; accumulate from 0
                plan.credits = Some(plan.credits.unwrap_or(0) + granted);
            }
            PlanTier::Free => {}
        };
        let plan = self.plans.upsert(user_id, &apply).await?;

        info!(
            "User {} upgraded to {} plan (reference: {}, amount: {:?})",
            user_id, target, reference, payment.amount
        );

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryPaymentEvents, MemoryPlanStore};
    use pretty_assertions::assert_eq;

    fn service() -> (PlanAdminService, Arc<MemoryPlanStore>) {
        let plans = Arc::new(MemoryPlanStore::new());
        let payments = Arc::new(MemoryPaymentEvents::new());
        (PlanAdminService::new(plans.clone(), payments), plans)
    }

    fn payment(reference: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            reference: reference.to_string(),
            amount: Some(serde_json::json!(19.99)),
        }
    }

    #[tokio::test]
    async fn usage_upgrades_accumulate_credits() {
        let (service, plans) = service();
        let user_id = Uuid::new_v4();
        plans
            .upsert(&user_id, &|plan| {
                plan.tier = PlanTier::Usage;
                plan.credits = Some(10);
            })
            .await
            .unwrap();

        let first = service
            .upgrade(&user_id, PlanTier::Usage, Some(50), payment("0xaaa"))
            .await
            .unwrap();
        assert_eq!(first.credits, Some(60));

        let second = service
            .upgrade(&user_id, PlanTier::Usage, Some(50), payment("0xbbb"))
            .await
            .unwrap();
        assert_eq!(second.credits, Some(110));
        assert_eq!(second.tier, PlanTier::Usage);
    }

    #[tokio::test]
    async fn pro_upgrade_always_clears_credits() {
        let (service, plans) = service();
        let user_id = Uuid::new_v4();
        plans
            .upsert(&user_id, &|plan| {
                plan.tier = PlanTier::Usage;
                plan.credits = Some(42);
            })
            .await
            .unwrap();

        let plan = service
            .upgrade(&user_id, PlanTier::Pro, None, payment("0xccc"))
            .await
            .unwrap();
        assert_eq!(plan.tier, PlanTier::Pro);
        assert_eq!(plan.credits, None);
    }

    #[tokio::test]
    async fn usage_upgrade_after_pro_accumulates_from_zero() {
        let (service, _) = service();
        let user_id = Uuid::new_v4();

        service
            .upgrade(&user_id, PlanTier::Pro, None, payment("0x111"))
            .await
            .unwrap();
        let plan = service
            .upgrade(&user_id, PlanTier::Usage, Some(25), payment("0x222"))
            .await
            .unwrap();

        assert_eq!(plan.tier, PlanTier::Usage);
        assert_eq!(plan.credits, Some(25));
    }

    #[tokio::test]
    async fn replayed_payment_reference_is_a_no_op() {
        let (service, _) = service();
        let user_id = Uuid::new_v4();

        let first = service
            .upgrade(&user_id, PlanTier::Usage, Some(50), payment("0xdup"))
            .await
            .unwrap();
        assert_eq!(first.credits, Some(50));

        let replay = service
            .upgrade(&user_id, PlanTier::Usage, Some(50), payment("0xdup"))
            .await
            .unwrap();
        assert_eq!(replay.credits, Some(50));
    }

    #[tokio::test]
    async fn free_tier_is_not_purchasable() {
        let (service, _) = service();
        let err = service
            .upgrade(&Uuid::new_v4(), PlanTier::Free, None, payment("0xeee"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn usage_upgrade_requires_positive_credits() {
        let (service, _) = service();
        let user_id = Uuid::new_v4();

        assert!(service
            .upgrade(&user_id, PlanTier::Usage, None, payment("0xfff"))
            .await
            .is_err());
        assert!(service
            .upgrade(&user_id, PlanTier::Usage, Some(0), payment("0xggg"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn missing_payment_reference_is_rejected() {
        let (service, _) = service();
        let err = service
            .upgrade(
                &Uuid::new_v4(),
                PlanTier::Pro,
                None,
                PaymentConfirmation {
                    reference: "  ".to_string(),
                    amount: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}
