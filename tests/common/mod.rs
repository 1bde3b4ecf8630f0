//! Shared helpers for integration tests: app construction, webhook signing and
//! a stand-in for Stripe's checkout session endpoint.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;

pub use pledge_checkout::config::Config;
pub use pledge_checkout::payments::sign_payload;
pub use pledge_checkout::state::AppState;

pub const TEST_SECRET_KEY: &str = "sk_test_123";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const MOCK_SESSION_ID: &str = "cs_test_123";
pub const MOCK_CHECKOUT_URL: &str = "https://checkout.stripe.com/c/pay/cs_test_123";

/// The static directory shipped with the crate.
pub fn shipped_static_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("static")
}

pub fn test_config(stripe_api_base: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 4242,
        base_url: "http://127.0.0.1:4242".to_string(),
        static_dir: shipped_static_dir(),
        stripe_secret_key: TEST_SECRET_KEY.to_string(),
        stripe_webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
        stripe_api_base: stripe_api_base.to_string(),
        stripe_timeout: Duration::from_secs(5),
        webhook_tolerance: Duration::from_secs(300),
        success_url: "http://127.0.0.1:4242/thank-you".to_string(),
        cancel_url: "http://127.0.0.1:4242/error".to_string(),
        unit_price: 1000,
        total_units: 80,
        campaign_name: "Ramadan Pledge".to_string(),
    }
}

pub fn test_app(config: Config) -> Router {
    let state = AppState::new(config).expect("test state should build");
    pledge_checkout::app(state)
}

/// App whose Stripe calls go nowhere; for routes that never reach Stripe.
pub fn offline_app() -> Router {
    test_app(test_config("http://127.0.0.1:9"))
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn signed_webhook_request(payload: &[u8], signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload.to_vec()))
        .unwrap()
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get("location")
        .expect("response should redirect")
        .to_str()
        .unwrap()
        .to_string()
}

// ============ Mock Stripe ============

#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    Succeed,
    /// Answer like Stripe does for an invalid request
    Reject,
    /// Never answer within any reasonable client timeout
    Hang,
    /// Answer 200 with a body that is not a checkout session
    Garbled,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub params: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone)]
struct MockState {
    behavior: MockBehavior,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockStripe {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockStripe {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub async fn spawn_mock_stripe(behavior: MockBehavior) -> MockStripe {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/checkout/sessions", post(mock_create_session))
        .with_state(MockState {
            behavior,
            requests: requests.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockStripe {
        base_url: format!("http://{}", addr),
        requests,
    }
}

async fn mock_create_session(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        params,
    });

    match state.behavior {
        MockBehavior::Succeed => Json(json!({
            "id": MOCK_SESSION_ID,
            "object": "checkout.session",
            "url": MOCK_CHECKOUT_URL,
        }))
        .into_response(),
        MockBehavior::Reject => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "message": "Invalid currency: xyz",
                    "type": "invalid_request_error",
                }
            })),
        )
            .into_response(),
        MockBehavior::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
        MockBehavior::Garbled => (StatusCode::OK, "<html>upstream proxy</html>").into_response(),
    }
}
