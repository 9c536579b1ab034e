use super::middleware::AuthenticatedUser;
use crate::db::UserRole;
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let email = req.email.clone().unwrap_or_default();
    info!("registration request for {}", email);

    match state.auth.register(req.into_inner()).await {
        Ok((user, tokens)) => Ok(HttpResponse::Created().json(json!({
            "success": true,
            "data": {
                "user": user,
                "token": tokens.token,
                "refreshToken": tokens.refresh_token,
            },
            "message": "Registration successful",
        }))),
        Err(e) => {
            error!("registration failed for {}: {}", email, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let email = req.email.clone().unwrap_or_default();

    match state.auth.login(req.into_inner()).await {
        Ok((user, tokens)) => {
            // Best effort: cache unavailability must not fail the login.
            state.cache.set_session(&user.id.to_string(), &user).await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": {
                    "user": user,
                    "token": tokens.token,
                    "refreshToken": tokens.refresh_token,
                },
                "message": "Login successful",
            })))
        }
        Err(e) => {
            error!("login failed for {}: {}", email, e);
            Err(e)
        }
    }
}

pub async fn refresh_token(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .into_inner()
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Refresh token is required".to_string()))?;

    let tokens = state.auth.refresh(&token).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "token": tokens.token,
            "refreshToken": tokens.refresh_token,
        },
    })))
}

pub async fn me(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let profile = state.auth.current_user(user.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": profile,
    })))
}
