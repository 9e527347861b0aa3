use actix_web::{web, App, HttpServer, middleware::Logger};
use actix_cors::Cors;
use dotenv::dotenv;
use std::net::TcpListener;
use std::sync::Arc;

mod clients;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

use crate::clients::vision_client::{OpenAiVisionClient, VisionEngine};
use crate::config::AppSettings;
use crate::db::connection::{create_pool, verify_connection};
use crate::db::repositories::{PaymentEventRepository, PlanRepository, UsageRepository};
use crate::db::stores::{PaymentEventStore, PlanStore, UsageLedger};
use crate::middleware::SecureAuthentication;
use crate::routes::configure_routes;
use crate::services::accounting::{AccountingEngine, QuotaPolicy};
use crate::services::auth::jwt;
use crate::services::plan_admin::PlanAdminService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load application settings
    let app_settings = match AppSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load application settings: {}", e);
            log::error!("Cannot start server without valid settings");
            std::process::exit(1);
        }
    };

    // Initialize JWT keys with the configured secret
    if let Err(e) = jwt::init_jwt_keys(&app_settings.auth.jwt_secret) {
        log::error!("Failed to initialize JWT keys: {}", e);
        log::error!("Cannot start server without working JWT keys");
        std::process::exit(1);
    }
    log::info!("JWT keys initialized successfully");

    // Database connection setup
    let db_pool = match create_pool(&app_settings.database.url).await {
        Ok(pool) => {
            if let Err(e) = verify_connection(&pool).await {
                log::error!("Database connection verification failed: {}", e);
                log::error!("Cannot start server without a working database connection");
                std::process::exit(1);
            }
            log::info!("Database connection established successfully");
            pool
        }
        Err(e) => {
            log::error!("Failed to create database connection pool: {}", e);
            log::error!("Cannot start server without a working database connection");
            std::process::exit(1);
        }
    };

    // Wire the store backends
    let plan_store: Arc<dyn PlanStore> = Arc::new(PlanRepository::new(db_pool.clone()));
    let usage_ledger: Arc<dyn UsageLedger> = Arc::new(UsageRepository::new(db_pool.clone()));
    let payment_events: Arc<dyn PaymentEventStore> =
        Arc::new(PaymentEventRepository::new(db_pool.clone()));

    // Accounting engine and plan administration
    let accounting_engine = web::Data::new(AccountingEngine::new(
        plan_store.clone(),
        usage_ledger,
        QuotaPolicy::from_config(&app_settings.quota),
    ));
    let plan_admin = web::Data::new(PlanAdminService::new(plan_store, payment_events));

    // Vision provider client
    let vision_engine: Arc<dyn VisionEngine> =
        Arc::new(OpenAiVisionClient::new(&app_settings.ai));
    let vision_engine = web::Data::new(vision_engine);
    log::info!("Vision client initialized for model {}", app_settings.ai.vision_model);

    // Get server host and port from settings
    let host = &app_settings.server.host;
    let port = app_settings.server.port;

    log::info!("Starting server at http://{}:{}", host, port);

    let server_addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(server_addr)?;

    HttpServer::new(move || {
        let app_settings = app_settings.clone();

        // Configure CORS using actix-cors
        let mut cors = Cors::default().supports_credentials();

        if app_settings.server.cors_origins.contains(&"*".to_string()) {
            cors = cors.allow_any_origin();
        } else {
            for origin in &app_settings.server.cors_origins {
                cors = cors.allowed_origin(origin);
            }
        }

        cors = cors.allow_any_method().allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(app_settings.clone()))
            .app_data(accounting_engine.clone())
            .app_data(plan_admin.clone())
            .app_data(vision_engine.clone())
            // Health check endpoint without auth
            .service(
                web::resource("/health")
                    .route(web::get().to(handlers::health::health_check))
            )
            // Protected API routes with authentication
            .service(
                web::scope("/api")
                    .wrap(SecureAuthentication::new())
                    .configure(configure_routes)
            )
    })
    .listen(listener)?
    .run()
    .await
}
