pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use std::time::Duration;

pub use config::Settings;
pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;

use auth::handlers::{login, me, refresh_token, register};
use auth::{
    AuthService, PasswordHasher, RateLimit, RateLimitPreset, RateLimitPresets, RateLimiter,
    RequireRole, TokenService,
};
use cache::{CacheClient, KeyValueStore, MemoryStore};
use db::{IdentityStore, PgIdentityStore};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components. Stores are injected so
/// tests can substitute in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth: AuthService,
    pub tokens: TokenService,
    pub limiter: RateLimiter,
    pub rate_limits: RateLimitPresets,
    pub cache: CacheClient,
}

impl AppState {
    /// Production wiring: Postgres identity store (migrations applied on
    /// connect) and the in-process key-value store.
    pub async fn new(config: Settings) -> Result<Self> {
        let store = PgIdentityStore::connect(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(5),
        )
        .await?;

        Ok(Self::with_stores(
            config,
            Arc::new(store),
            Arc::new(MemoryStore::new()),
        ))
    }

    pub fn with_stores(
        config: Settings,
        store: Arc<dyn IdentityStore>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let tokens = TokenService::from_config(&config.auth);
        let auth = AuthService::new(
            Arc::clone(&store),
            tokens.clone(),
            PasswordHasher::new(config.auth.bcrypt_cost),
        );
        let limiter = RateLimiter::new(Arc::clone(&kv));
        let rate_limits = RateLimitPresets::from_config(&config.rate_limit);
        let cache = CacheClient::new(kv, Duration::from_secs(config.cache.session_ttl_secs));

        Self {
            config: Arc::new(config),
            auth,
            tokens,
            limiter,
            rate_limits,
            cache,
        }
    }
}

/// Route table, shared between main and the integration tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .route("/health", web::get().to(health_check))
    .service(
        web::scope("/auth")
            .service(
                web::resource("/register")
                    .route(web::post().to(register))
                    .wrap(RateLimit::new(RateLimitPreset::Auth)),
            )
            .service(
                web::resource("/login")
                    .route(web::post().to(login))
                    .wrap(RateLimit::new(RateLimitPreset::Auth)),
            )
            .service(web::resource("/refresh-token").route(web::post().to(refresh_token)))
            .service(
                web::resource("/me")
                    .route(web::get().to(me))
                    // Wraps run outside-in: authentication first, then the
                    // general API ceiling.
                    .wrap(RateLimit::new(RateLimitPreset::Api))
                    .wrap(RequireRole::authenticated()),
            ),
    );
}
