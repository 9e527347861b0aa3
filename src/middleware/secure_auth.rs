use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures_util::future::{ok, ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use log::{debug, warn};
use uuid::Uuid;

use crate::services::auth::jwt;

// Marker struct to indicate request has already been processed by auth middleware
#[derive(Debug)]
struct AuthProcessed;

// User identity extracted after successful authentication
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

// Implement FromRequest for UserId to extract it in handlers
impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &actix_web::HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let extensions = req.extensions();
        let user_id_opt = extensions.get::<UserId>().copied();
        let request_path = req.path().to_string();

        Box::pin(async move {
            user_id_opt.ok_or_else(|| {
                log::error!("UserId not found in request extensions. Auth middleware might not have run or failed for path: {}", request_path);
                actix_web::error::ErrorInternalServerError(
                    "Authentication context not found. Please ensure authentication middleware is correctly configured and has run."
                )
            })
        })
    }
}

/// Authentication middleware validating the bearer JWT and stashing the
/// caller's `UserId` in request extensions. Rejections are uniform so a
/// probe cannot learn whether a user id exists.
#[derive(Clone, Default)]
pub struct SecureAuthentication;

impl SecureAuthentication {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecureAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecureAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SecureAuthenticationMiddleware {
            service: Arc::new(service),
        })
    }
}

#[derive(Clone)]
pub struct SecureAuthenticationMiddleware<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for SecureAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        debug!("SecureAuthentication middleware called for: {} {}", req.method(), req.path());

        // Check if request has already been processed by this middleware
        if req.extensions().get::<AuthProcessed>().is_some() {
            return Box::pin(service.call(req));
        }

        let path = req.path().to_string();

        // Skip auth check for OPTIONS requests (CORS pre-flight)
        if req.method() == actix_web::http::Method::OPTIONS {
            req.extensions_mut().insert(AuthProcessed);
            return Box::pin(service.call(req));
        }

        req.extensions_mut().insert(AuthProcessed);

        // Extract the token from the Authorization header
        let token = match req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        {
            Some(token) => token.to_string(),
            None => {
                warn!("Missing or malformed Authorization header for path: {}", path);
                return Box::pin(ready(Err(Error::from(actix_web::error::ErrorUnauthorized(
                    "Missing Authorization header",
                )))));
            }
        };

        let claims = match jwt::validate_token(&token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("Token validation failed for path {}: {}", path, e);
                return Box::pin(ready(Err(Error::from(actix_web::error::ErrorUnauthorized(
                    "Invalid or expired token",
                )))));
            }
        };

        let user_id = match Uuid::parse_str(&claims.sub) {
            Ok(user_id) => user_id,
            Err(_) => {
                warn!("Token subject is not a valid user id for path: {}", path);
                return Box::pin(ready(Err(Error::from(actix_web::error::ErrorUnauthorized(
                    "Invalid or expired token",
                )))));
            }
        };

        req.extensions_mut().insert(UserId(user_id));

        Box::pin(service.call(req))
    }
}
