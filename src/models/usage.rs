use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One metered request, append-only. `generated_content` holds the opaque
/// result payload; it is null when the request completed without a storable
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub generated_content: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Payload for appending to the usage ledger. The caller supplies
/// `created_at` so commits stamp the moment of consumption, not the moment
/// the write lands.
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub user_id: Uuid,
    pub endpoint: String,
    pub generated_content: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
