use crate::cache::KeyValueStore;
use crate::config::RateLimitConfigSection;
use crate::error::AppError;
use crate::AppState;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, Error};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A single fixed-window rule: at most `max_requests` per `window` for a
/// given client+route key.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub message: String,
}

/// The three route presets, built once from settings and shared through
/// application state.
#[derive(Debug, Clone)]
pub struct RateLimitPresets {
    pub auth: RateLimitConfig,
    pub api: RateLimitConfig,
    pub strict: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPreset {
    /// Narrow window, low ceiling: blunts credential stuffing on
    /// login/register.
    Auth,
    /// General API traffic.
    Api,
    /// Especially sensitive routes.
    Strict,
}

impl RateLimitPresets {
    pub fn from_config(section: &RateLimitConfigSection) -> Self {
        Self {
            auth: RateLimitConfig {
                window: Duration::from_secs(section.auth_window_secs),
                max_requests: section.auth_max_requests,
                message: "Too many login attempts, please try again later".to_string(),
            },
            api: RateLimitConfig {
                window: Duration::from_secs(section.api_window_secs),
                max_requests: section.api_max_requests,
                message: "Too many requests, please try again later".to_string(),
            },
            strict: RateLimitConfig {
                window: Duration::from_secs(section.strict_window_secs),
                max_requests: section.strict_max_requests,
                message: "Too many requests, please try again later".to_string(),
            },
        }
    }

    pub fn get(&self, preset: RateLimitPreset) -> &RateLimitConfig {
        match preset {
            RateLimitPreset::Auth => &self.auth,
            RateLimitPreset::Api => &self.api,
            RateLimitPreset::Strict => &self.strict,
        }
    }
}

/// Outcome of a rate-limit check. The degraded variant exists so the
/// fail-open path is visible to callers and observability instead of being
/// silently folded into `Allowed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset: DateTime<Utc>,
    },
    /// The counter store was unreachable; the request is allowed anyway.
    /// Availability wins over strict enforcement here.
    AllowedDegraded { limit: u32 },
    Limited { limit: u32, retry_after: Duration },
}

/// Fixed-window counter over the shared key-value store. The window starts
/// with the first request (the TTL is set on the first increment) and the
/// counter disappears with the key when the window ends.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        client: &str,
        path: &str,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        let key = format!("rate_limit:{}:{}", client, path);

        let count = match self.store.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!("rate limiter backend failure, allowing request: {}", e);
                return RateLimitDecision::AllowedDegraded {
                    limit: config.max_requests,
                };
            }
        };

        if count == 1 {
            if let Err(e) = self.store.expire(&key, config.window).await {
                warn!("rate limiter failed to set window expiry for {}: {}", key, e);
            }
        }

        if count > i64::from(config.max_requests) {
            RateLimitDecision::Limited {
                limit: config.max_requests,
                retry_after: config.window,
            }
        } else {
            RateLimitDecision::Allowed {
                limit: config.max_requests,
                remaining: config.max_requests.saturating_sub(count as u32),
                reset: Utc::now() + ChronoDuration::milliseconds(config.window.as_millis() as i64),
            }
        }
    }
}

/// Route-level middleware applying one of the presets. Allowed responses
/// carry `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
/// headers; rejected requests get a 429 with a retry-after hint in the body.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    preset: RateLimitPreset,
}

impl RateLimit {
    pub fn new(preset: RateLimitPreset) -> Self {
        Self { preset }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            preset: self.preset,
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    preset: RateLimitPreset,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
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
        let preset = self.preset;

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| AppError::Internal("application state missing".to_string()))?
                .clone();

            let client = {
                let info = req.connection_info();
                info.realip_remote_addr().unwrap_or("unknown").to_string()
            };
            let path = req.path().to_string();

            let config = state.rate_limits.get(preset).clone();
            let decision = state.limiter.check(&client, &path, &config).await;

            match decision {
                RateLimitDecision::Limited { retry_after, .. } => {
                    warn!("rate limit exceeded for {} on {}", client, path);
                    Err(AppError::RateLimited {
                        message: config.message,
                        retry_after_ms: retry_after.as_millis() as u64,
                    }
                    .into())
                }
                RateLimitDecision::Allowed {
                    limit,
                    remaining,
                    reset,
                } => {
                    let mut res = service.call(req).await?;
                    let headers = res.headers_mut();
                    headers.insert(
                        HeaderName::from_static("x-ratelimit-limit"),
                        HeaderValue::from(limit),
                    );
                    headers.insert(
                        HeaderName::from_static("x-ratelimit-remaining"),
                        HeaderValue::from(remaining),
                    );
                    headers.insert(
                        HeaderName::from_static("x-ratelimit-reset"),
                        HeaderValue::from(reset.timestamp_millis() as u64),
                    );
                    Ok(res)
                }
                RateLimitDecision::AllowedDegraded { limit } => {
                    let mut res = service.call(req).await?;
                    res.headers_mut().insert(
                        HeaderName::from_static("x-ratelimit-limit"),
                        HeaderValue::from(limit),
                    );
                    Ok(res)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::FaultyStore;
    use crate::cache::MemoryStore;

    fn config(max: u32, window: Duration) -> RateLimitConfig {
        RateLimitConfig {
            window,
            max_requests: max,
            message: "Too many requests".to_string(),
        }
    }

    #[tokio::test]
    async fn test_requests_allowed_up_to_ceiling() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let cfg = config(5, Duration::from_secs(60));

        for i in 0..5 {
            match limiter.check("1.2.3.4", "/auth/login", &cfg).await {
                RateLimitDecision::Allowed { remaining, limit, .. } => {
                    assert_eq!(limit, 5);
                    assert_eq!(remaining, 4 - i);
                }
                other => panic!("expected Allowed, got {:?}", other),
            }
        }

        match limiter.check("1.2.3.4", "/auth/login", &cfg).await {
            RateLimitDecision::Limited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("expected Limited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_counters_are_per_client_and_route() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let cfg = config(1, Duration::from_secs(60));

        assert!(matches!(
            limiter.check("1.2.3.4", "/auth/login", &cfg).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("1.2.3.4", "/auth/login", &cfg).await,
            RateLimitDecision::Limited { .. }
        ));
        // Different client, different route: independent counters.
        assert!(matches!(
            limiter.check("5.6.7.8", "/auth/login", &cfg).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("1.2.3.4", "/auth/register", &cfg).await,
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_new_window_resets_the_counter() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let cfg = config(2, Duration::from_millis(100));

        limiter.check("1.2.3.4", "/x", &cfg).await;
        limiter.check("1.2.3.4", "/x", &cfg).await;
        assert!(matches!(
            limiter.check("1.2.3.4", "/x", &cfg).await,
            RateLimitDecision::Limited { .. }
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(matches!(
            limiter.check("1.2.3.4", "/x", &cfg).await,
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FaultyStore));
        let cfg = config(1, Duration::from_secs(60));

        for _ in 0..10 {
            assert_eq!(
                limiter.check("1.2.3.4", "/x", &cfg).await,
                RateLimitDecision::AllowedDegraded { limit: 1 }
            );
        }
    }

    #[test]
    fn test_presets_from_config() {
        let section = RateLimitConfigSection {
            auth_max_requests: 5,
            auth_window_secs: 900,
            api_max_requests: 100,
            api_window_secs: 900,
            strict_max_requests: 10,
            strict_window_secs: 60,
        };
        let presets = RateLimitPresets::from_config(&section);

        assert_eq!(presets.get(RateLimitPreset::Auth).max_requests, 5);
        assert_eq!(
            presets.get(RateLimitPreset::Auth).window,
            Duration::from_secs(900)
        );
        assert_eq!(presets.get(RateLimitPreset::Api).max_requests, 100);
        assert_eq!(
            presets.get(RateLimitPreset::Strict).window,
            Duration::from_secs(60)
        );
    }
}
