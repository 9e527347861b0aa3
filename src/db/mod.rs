pub mod connection;
pub mod memory;
pub mod repositories;
pub mod stores;

pub use stores::{PaymentEventStore, PlanStore, UsageLedger};
