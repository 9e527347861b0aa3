pub mod accounting;
pub mod auth;
pub mod plan_admin;
