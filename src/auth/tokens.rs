use crate::config::AuthConfig;
use crate::db::{User, UserRole};
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in an access token: enough to authorize a request
/// without touching the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Refresh tokens carry no role: they can only mint a new pair, and the
/// role is re-read from the store at refresh time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Issues and verifies the two token families. Separate secrets mean a
/// leaked access secret cannot forge refresh tokens and vice versa; both
/// tokens are stateless, so a refresh token stays usable until its natural
/// expiry (there is no revocation list).
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(
        access_secret: String,
        refresh_secret: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.access_token_secret.clone(),
            auth.refresh_token_secret.clone(),
            Duration::hours(auth.access_token_expiry_hours),
            Duration::days(auth.refresh_token_expiry_days),
        )
    }

    pub fn issue_access_token(
        &self,
        id: Uuid,
        email: &str,
        role: UserRole,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: id,
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn issue_refresh_token(&self, id: Uuid, email: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    /// Both tokens for a freshly authenticated identity.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            token: self.issue_access_token(user.id, &user.email, user.role)?,
            refresh_token: self.issue_refresh_token(user.id, &user.email)?,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &validation(),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &validation(),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Authentication("Invalid refresh token".to_string()))
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

/// Parse an `Authorization: Bearer <token>` header value. Returns `None`
/// (not an error) when the header is absent or malformed, so callers can
/// tell "no credential supplied" apart from "bad credential".
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
