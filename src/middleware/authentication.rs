/// Authentication middleware.
///
/// Extracts the bearer token from the Authorization header, resolves it
/// through the authenticator (signature, expiry, type, revocation, user
/// lookup, active check) and injects the resulting `CurrentUser` into
/// request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::error::{AppError, AuthError};

/// Pull the credentials out of an Authorization header value. The auth
/// scheme is matched case-insensitively (RFC 6750 §2.1).
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("Bearer") {
        Some(token.trim_start())
    } else {
        None
    }
}

/// Must be applied to routes that require authentication.
pub struct AuthenticationMiddleware {
    authenticator: Arc<Authenticator>,
}

impl AuthenticationMiddleware {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthenticationMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthenticationMiddlewareService {
            service: Rc::new(service),
            authenticator: self.authenticator.clone(),
        }))
    }
}

pub struct AuthenticationMiddlewareService<S> {
    service: Rc<S>,
    authenticator: Arc<Authenticator>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string);

        let authenticator = self.authenticator.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let token = match bearer {
                Some(token) => token,
                None => {
                    tracing::warn!("Missing or invalid Authorization header");
                    return Err(AppError::from(AuthError::MissingToken).into());
                }
            };

            // AppError's ResponseError impl logs the specific failure kind
            // and emits the collapsed generic unauthorized body.
            let current_user = authenticator.resolve(&token).await?;

            tracing::debug!(
                user_id = %current_user.user.id,
                "Bearer token resolved"
            );
            req.extensions_mut().insert(current_user);

            service.call(req).await
        })
    }
}
