use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, HttpResponseBuilder, Result as ActixResult};
use log::{debug, warn};
use std::sync::Arc;

use crate::clients::vision_client::{GenerationRequest, PriorProduct, VisionEngine};
use crate::config::AppSettings;
use crate::error::AppError;
use crate::middleware::secure_auth::UserId;
use crate::models::plan::PlanTier;
use crate::services::accounting::{AccountingEngine, Decision, GenerationOutcome};
use crate::utils::image_validation::validate_image_upload;
use crate::utils::multipart_utils::process_generate_multipart;

const GENERATE_ENDPOINT: &str = "generate";

/// Turn an uploaded product image into a filled product form.
///
/// Order matters here: the quota check runs before the upload is consumed,
/// and commit only runs once the generation has succeeded, so a failed AI
/// call never costs a credit.
pub async fn generate_product(
    user_id: UserId,
    payload: Multipart,
    engine: web::Data<AccountingEngine>,
    vision: web::Data<Arc<dyn VisionEngine>>,
    settings: web::Data<AppSettings>,
) -> ActixResult<HttpResponse, AppError> {
    let decision = engine.authorize(&user_id.0).await?;
    if !decision.allowed {
        return Ok(quota_exceeded_response(
            &decision,
            settings.quota.free_tier_limit,
        ));
    }

    let upload = process_generate_multipart(payload).await?;
    debug!(
        "Processing generation upload {} ({} bytes) for user {}",
        upload.filename,
        upload.image_data.len(),
        user_id.0
    );
    validate_image_upload(
        &upload.mime_type,
        upload.image_data.len(),
        settings.ai.max_image_bytes,
    )?;

    // Prior generations give the model vendor/style context. Display-grade
    // data: an unavailable ledger must not block the request.
    let prior_products = match engine.recent_usage(&user_id.0, 3).await {
        Ok(records) => PriorProduct::from_records(&records),
        Err(e) => {
            warn!("Could not load usage history for user {}: {}", user_id.0, e);
            Vec::new()
        }
    };

    let product = vision
        .generate_product(GenerationRequest {
            image: upload.image_data,
            mime_type: upload.mime_type,
            hints: upload.hints,
            prior_products,
        })
        .await?;

    let content = serde_json::to_value(&product)?;
    engine
        .commit(
            &user_id.0,
            GenerationOutcome {
                endpoint: GENERATE_ENDPOINT.to_string(),
                content: Some(content),
            },
        )
        .await;

    // Re-check so the response carries post-commit quota numbers
    let updated = match engine.authorize(&user_id.0).await {
        Ok(updated) => updated,
        Err(e) => {
            warn!("Could not refresh quota for user {}: {}", user_id.0, e);
            decision
        }
    };

    let mut response = HttpResponse::Ok();
    apply_rate_limit_headers(&mut response, &updated, settings.quota.free_tier_limit);
    Ok(response.json(serde_json::json!({
        "success": true,
        "data": product,
        "meta": {
            "tier": updated.tier,
            "remaining": updated.remaining,
            "status": updated.status,
        }
    })))
}

fn quota_exceeded_response(decision: &Decision, free_limit: i64) -> HttpResponse {
    let message = match decision.tier {
        PlanTier::Free => format!(
            "You have reached your limit of {} requests per day. Please try again tomorrow.",
            free_limit
        ),
        _ => "You have no remaining credits. Please top up or upgrade your plan.".to_string(),
    };

    let mut response = HttpResponse::TooManyRequests();
    apply_rate_limit_headers(&mut response, decision, free_limit);
    response.json(serde_json::json!({
        "error": "Rate limit exceeded",
        "message": message,
        "remaining": decision.remaining,
        "resetAt": decision.reset_at,
    }))
}

fn apply_rate_limit_headers(builder: &mut HttpResponseBuilder, decision: &Decision, free_limit: i64) {
    if let Some(remaining) = decision.remaining {
        if decision.tier == PlanTier::Free {
            builder.insert_header(("X-RateLimit-Limit", free_limit.to_string()));
        }
        builder.insert_header(("X-RateLimit-Remaining", remaining.to_string()));
    }
    if let Some(reset_at) = decision.reset_at {
        builder.insert_header(("X-RateLimit-Reset", reset_at.to_rfc3339()));
    }
}
