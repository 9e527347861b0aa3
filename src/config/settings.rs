use std::env;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub ai: AiConfig,
    pub quota: QuotaConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    pub openai_api_key: String,
    pub base_url: String,
    pub vision_model: String,
    pub max_image_bytes: u64,
}

/// What `authorize` does when the plan or usage store cannot be reached.
/// `Allow` keeps paying users unblocked during a transient outage; `Deny`
/// refuses every metered request until the store recovers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreErrorPolicy {
    Allow,
    Deny,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub free_tier_limit: i64,
    pub free_tier_window_hours: i64,
    pub on_store_error: StoreErrorPolicy,
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        // App config
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "shopfill".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Database config
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Configuration("DATABASE_URL must be set".to_string()))?;

        // Server config
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| AppError::Configuration("SERVER_PORT must be a valid port number".to_string()))?;

        // CORS origins
        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        // Auth config
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Configuration("JWT_SECRET must be set".to_string()))?;

        // AI provider config
        let openai_api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| AppError::Configuration("OPENAI_API_KEY must be set".to_string()))?;

        let ai_base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let vision_model = env::var("OPENAI_VISION_MODEL")
            .unwrap_or_else(|_| "gpt-4o".to_string());

        let max_image_bytes = env::var("MAX_IMAGE_BYTES")
            .unwrap_or_else(|_| "10485760".to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Configuration("MAX_IMAGE_BYTES must be a valid number".to_string()))?;

        // Quota config
        let free_tier_limit = env::var("FREE_TIER_LIMIT")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<i64>()
            .map_err(|_| AppError::Configuration("FREE_TIER_LIMIT must be a valid number".to_string()))?;

        let free_tier_window_hours = env::var("FREE_TIER_WINDOW_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse::<i64>()
            .map_err(|_| AppError::Configuration("FREE_TIER_WINDOW_HOURS must be a valid number".to_string()))?;

        let on_store_error = match env::var("ON_STORE_ERROR")
            .unwrap_or_else(|_| "allow".to_string())
            .to_lowercase()
            .as_str()
        {
            "allow" => StoreErrorPolicy::Allow,
            "deny" => StoreErrorPolicy::Deny,
            other => {
                return Err(AppError::Configuration(format!(
                    "ON_STORE_ERROR must be 'allow' or 'deny', got '{}'",
                    other
                )));
            }
        };

        Ok(Self {
            app: AppConfig {
                name: app_name,
                environment,
            },
            database: DatabaseConfig {
                url: database_url,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
                cors_origins,
            },
            auth: AuthConfig {
                jwt_secret,
            },
            ai: AiConfig {
                openai_api_key,
                base_url: ai_base_url,
                vision_model,
                max_image_bytes,
            },
            quota: QuotaConfig {
                free_tier_limit,
                free_tier_window_hours,
                on_store_error,
            },
        })
    }
}
