pub mod auth_claims;
pub mod plan;
pub mod product;
pub mod usage;

pub use plan::{PlanStatus, PlanSummary, PlanTier, UserPlan};
pub use product::ProductContent;
pub use usage::{NewUsageRecord, UsageRecord};
