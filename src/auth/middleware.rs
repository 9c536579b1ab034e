use super::tokens::extract_bearer;
use crate::db::UserRole;
use crate::error::AppError;
use crate::AppState;
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, LocalBoxFuture, Ready};
use serde::Serialize;
use std::collections::HashSet;
use std::rc::Rc;
use uuid::Uuid;

/// Identity attached to a request once its access token has been verified.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

fn verify_bearer(
    state: &AppState,
    auth_header: Option<&str>,
) -> Result<AuthenticatedUser, AppError> {
    let token = auth_header
        .and_then(extract_bearer)
        .ok_or_else(|| AppError::Authentication("No token provided".to_string()))?;

    let claims = state.tokens.verify_access_token(token)?;
    Ok(AuthenticatedUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
    })
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    // A role-gating middleware may already have verified this request.
    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        return Ok(user.clone());
    }

    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("application state missing".to_string()))?;
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    verify_bearer(state, header_value)
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

/// Optional-auth extractor: a valid token attaches the identity, anything
/// else (absent, malformed, expired) proceeds unauthenticated.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequest for MaybeUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(MaybeUser(authenticate(req).ok())))
    }
}

/// Route-level guard: verifies the access token and checks the caller's
/// role against the route's allowed set. On success the identity is placed
/// in the request extensions for handlers and extractors downstream.
#[derive(Debug, Clone)]
pub struct RequireRole {
    allowed: HashSet<UserRole>,
}

impl RequireRole {
    pub fn allow(roles: impl IntoIterator<Item = UserRole>) -> Self {
        Self {
            allowed: roles.into_iter().collect(),
        }
    }

    /// Any authenticated identity, regardless of role.
    pub fn authenticated() -> Self {
        Self::allow([
            UserRole::Admin,
            UserRole::Doctor,
            UserRole::Nurse,
            UserRole::Patient,
        ])
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequireRoleMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleMiddleware {
            service: Rc::new(service),
            allowed: Rc::new(self.allowed.clone()),
        }))
    }
}

pub struct RequireRoleMiddleware<S> {
    service: Rc<S>,
    allowed: Rc<HashSet<UserRole>>,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let allowed = Rc::clone(&self.allowed);

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| AppError::Internal("application state missing".to_string()))?;
            let header_value = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            let user = verify_bearer(state, header_value)?;
            if !allowed.contains(&user.role) {
                return Err(
                    AppError::Forbidden("Insufficient permissions".to_string()).into()
                );
            }

            req.extensions_mut().insert(user);
            service.call(req).await
        })
    }
}
