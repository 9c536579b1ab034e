//! Authentication and session-security core: credential hashing, token
//! issuance/verification, request authorization, and the fixed-window rate
//! limiter protecting the auth endpoints.

pub mod handlers;
mod middleware;
mod password;
mod rate_limit;
mod service;
mod tokens;

pub use middleware::{AuthenticatedUser, MaybeUser, RequireRole};
pub use password::PasswordHasher;
pub use rate_limit::{
    RateLimit, RateLimitConfig, RateLimitDecision, RateLimitPreset, RateLimitPresets, RateLimiter,
};
pub use service::AuthService;
pub use tokens::{extract_bearer, AccessClaims, RefreshClaims, TokenPair, TokenService};
