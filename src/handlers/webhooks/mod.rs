mod stripe;

pub use stripe::*;

use axum::{Router, routing::post};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(handle_stripe_webhook))
}
