use crate::error::AppError;
use crate::models::auth_claims::Claims;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::info;
use std::sync::OnceLock;
use uuid::Uuid;

// Default JWT duration in days
pub const DEFAULT_JWT_DURATION_DAYS: i64 = 30;

// Global static holders for JWT keys
static JWT_ENCODING_KEY: OnceLock<EncodingKey> = OnceLock::new();
static JWT_DECODING_KEY: OnceLock<DecodingKey> = OnceLock::new();

/// Initialize the JWT keys from the secret.
/// This should be called once at application startup.
pub fn init_jwt_keys(jwt_secret_str: &str) -> Result<(), AppError> {
    info!("Initializing JWT keys from configuration");

    let jwt_secret = jwt_secret_str.as_bytes();

    let encoding_key = EncodingKey::from_secret(jwt_secret);
    JWT_ENCODING_KEY.set(encoding_key)
        .map_err(|_| AppError::Internal("JWT_ENCODING_KEY was already initialized".to_string()))?;

    let decoding_key = DecodingKey::from_secret(jwt_secret);
    JWT_DECODING_KEY.set(decoding_key)
        .map_err(|_| AppError::Internal("JWT_DECODING_KEY was already initialized".to_string()))?;

    info!("JWT keys initialized successfully");
    Ok(())
}

fn get_encoding_key() -> Result<EncodingKey, AppError> {
    JWT_ENCODING_KEY.get()
        .cloned()
        .ok_or_else(|| AppError::Configuration("JWT encoding key not initialized.".to_string()))
}

fn get_decoding_key() -> Result<DecodingKey, AppError> {
    JWT_DECODING_KEY.get()
        .cloned()
        .ok_or_else(|| AppError::Configuration("JWT decoding key not initialized.".to_string()))
}

/// Generate a JWT token for a user
pub fn generate_token(user_id: Uuid, token_duration_days: i64) -> Result<String, AppError> {
    let iat = Utc::now();
    let exp = iat
        .checked_add_signed(
            Duration::try_days(token_duration_days)
                .unwrap_or_else(|| Duration::days(DEFAULT_JWT_DURATION_DAYS)),
        )
        .ok_or_else(|| AppError::Internal("Failed to calculate JWT expiration time".to_string()))?;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: iat.timestamp(),
        exp: exp.timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &get_encoding_key()?)
        .map_err(|e| AppError::Internal(format!("Failed to encode JWT: {}", e)))
}

/// Validate a bearer token and return its claims.
/// Rejections never distinguish unknown users from bad tokens.
pub fn validate_token(token: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &get_decoding_key()?, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Auth("Invalid or expired token".to_string()))
}
