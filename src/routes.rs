use actix_web::web;
use crate::handlers;

/// Configures API routes that REQUIRE JWT authentication.
/// Mounted under the "/api" scope and wrapped with SecureAuthentication in main.rs.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Generation endpoint (/api/generate)
    cfg.route(
        "/generate",
        web::post().to(handlers::generate_handlers::generate_product),
    );

    // Quota standing (/api/quota)
    cfg.route("/quota", web::get().to(handlers::plan_handlers::get_quota));

    // Plan routes (/api/plan/*)
    cfg.service(
        web::scope("/plan")
            .route(
                "/current",
                web::get().to(handlers::plan_handlers::get_current_plan),
            )
            .route(
                "/upgrade",
                web::post().to(handlers::plan_handlers::upgrade_plan),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn routes_compile() {
        let _app = test::init_service(actix_web::App::new().configure(configure_routes)).await;
    }
}
