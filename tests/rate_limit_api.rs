mod common;

use actix_web::{test, web, App};
use carelink_server::routes;
use serde_json::json;

// The auth preset allows 5 requests per window per client+route; the sixth
// within the window is rejected with 429.
#[actix_web::test]
async fn test_register_rate_limit_ceiling() {
    let (state, _, _) = common::test_state();
    let limit = state.rate_limits.auth.max_requests;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes),
    )
    .await;

    for i in 0..limit {
        let resp = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(common::register_body(&format!("user{}@x.com", i), "patient"))
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 201);

        let limit_header = resp
            .headers()
            .get("x-ratelimit-limit")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let remaining = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        assert_eq!(limit_header.as_deref(), Some(limit.to_string().as_str()));
        assert_eq!(
            remaining.as_deref(),
            Some((limit - 1 - i).to_string().as_str())
        );
        assert!(resp.headers().contains_key("x-ratelimit-reset"));
    }

    let resp = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(common::register_body("over@x.com", "patient"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(
        body["error"]["message"],
        "Too many login attempts, please try again later"
    );
    assert!(body["error"]["retryAfter"].is_u64());
}

// Counters are keyed by (client, route): exhausting /auth/login does not
// consume the /auth/register budget.
#[actix_web::test]
async fn test_routes_have_independent_counters() {
    let (state, _, _) = common::test_state();
    let limit = state.rate_limits.auth.max_requests;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes),
    )
    .await;

    for _ in 0..=limit {
        test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"email": "nobody@x.com", "password": "nope"}))
            .send_request(&app)
            .await;
    }

    let resp = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(common::register_body("fresh@x.com", "patient"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 201);
}
