use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::secure_auth::UserId;
use crate::models::plan::PlanTier;
use crate::services::accounting::AccountingEngine;
use crate::services::plan_admin::{PaymentConfirmation, PlanAdminService};

/// Current quota standing plus the recent activity feed.
pub async fn get_quota(
    user_id: UserId,
    engine: web::Data<AccountingEngine>,
) -> ActixResult<HttpResponse, AppError> {
    let decision = engine.authorize(&user_id.0).await?;
    let recent = engine.recent_usage(&user_id.0, 10).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tier": decision.tier,
        "remaining": decision.remaining,
        "status": decision.status,
        "resetAt": decision.reset_at,
        "recentRequests": recent,
    })))
}

/// Full plan snapshot: stored plan, ledger totals, recent requests.
pub async fn get_current_plan(
    user_id: UserId,
    engine: web::Data<AccountingEngine>,
) -> ActixResult<HttpResponse, AppError> {
    let summary = engine.summary(&user_id.0).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": summary,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePlanRequest {
    pub plan_type: String,
    pub usage_credits: Option<i64>,
    pub transaction_hash: String,
    pub payment_amount: Option<serde_json::Value>,
}

/// Apply a confirmed payment to the caller's plan.
pub async fn upgrade_plan(
    user_id: UserId,
    body: web::Json<UpgradePlanRequest>,
    admin: web::Data<PlanAdminService>,
) -> ActixResult<HttpResponse, AppError> {
    let request = body.into_inner();
    let target = PlanTier::parse(&request.plan_type)?;

    let plan = admin
        .upgrade(
            &user_id.0,
            target,
            request.usage_credits,
            PaymentConfirmation {
                reference: request.transaction_hash,
                amount: request.payment_amount,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": plan,
        "message": format!("Successfully upgraded to {} plan", plan.tier),
    })))
}
