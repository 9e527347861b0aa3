use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::usage::UsageRecord;

/// Plan class a user is on. `usage` is a prepaid credit pool, `pro` is
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Usage,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Usage => "usage",
            PlanTier::Pro => "pro",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "free" => Ok(PlanTier::Free),
            "usage" => Ok(PlanTier::Usage),
            "pro" => Ok(PlanTier::Pro),
            other => Err(AppError::InvalidArgument(format!(
                "Invalid plan type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Trial,
    Expired,
}

/// A user's plan row. `credits = None` means unlimited and is only valid on
/// the `pro` tier; `free` and `usage` always carry a non-negative count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: PlanTier,
    pub credits: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPlan {
    /// The plan a user gets on first touch, before any upgrade.
    pub fn default_for(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            tier: PlanTier::Free,
            credits: Some(0),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Full plan snapshot returned by the plan summary endpoint: the stored plan
/// plus ledger-derived totals and the recent activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub plan_type: PlanTier,
    pub usage_credits: Option<i64>,
    pub total_requests: i64,
    pub requests_this_month: i64,
    pub plan_status: PlanStatus,
    pub recent_requests: Vec<UsageRecord>,
}
