pub mod payment_event_repository;
pub mod plan_repository;
pub mod usage_repository;

pub use payment_event_repository::PaymentEventRepository;
pub use plan_repository::PlanRepository;
pub use usage_repository::UsageRepository;
