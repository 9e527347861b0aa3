use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use crate::error::AppError;

/// Creates a PostgreSQL connection pool for the given database URL.
///
/// Configures the pool with bounded timeouts and retries the initial
/// connection a few times before giving up, since the database container
/// often comes up a moment after the server in local and CI environments.
pub async fn create_pool(database_url: &str) -> Result<PgPool, AppError> {
    log::info!("Creating database connection pool");

    let max_retries = 3;
    let mut last_error = None;

    for attempt in 1..=max_retries {
        log::info!("Database connection attempt {} of {}", attempt, max_retries);

        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                log::info!("Successfully connected to database");
                return Ok(pool);
            }
            Err(e) => {
                log::warn!("Database connection attempt {} failed: {}", attempt, e);

                if e.to_string().contains("authentication failed") {
                    log::error!("Database authentication failed. Please check your DATABASE_URL credentials.");
                    return Err(AppError::Database(e.to_string()));
                }

                last_error = Some(e);

                if attempt < max_retries {
                    let delay = Duration::from_secs(2 * attempt as u64);
                    log::info!("Retrying in {} seconds...", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let error = last_error.map(|e| e.to_string()).unwrap_or_else(|| {
        "Unknown database connection error".to_string()
    });

    log::error!("All database connection attempts failed: {}", error);

    Err(AppError::Database(error))
}

/// Verifies the database connection by executing a simple query.
pub async fn verify_connection(pool: &PgPool) -> Result<(), AppError> {
    // Raw query instead of the macro to avoid compile-time database checks
    sqlx::query_as::<_, (i32,)>("SELECT 1 as result")
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            log::error!("Database connection verification failed: {}", e);
            AppError::Database(e.to_string())
        })?;

    log::info!("Database connection verified successfully");
    Ok(())
}
