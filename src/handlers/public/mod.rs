mod pages;
mod pledge;

pub use pages::*;
pub use pledge::*;

use std::path::Path;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::services::{ServeDir, ServeFile};

use crate::state::AppState;

pub fn router(static_dir: &Path) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/pledge-options", get(pledge_options))
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/pledge", post(submit_pledge_form))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service("/thank-you", ServeFile::new(static_dir.join("thank-you.html")))
        .route_service("/error", ServeFile::new(static_dir.join("error.html")))
        .nest_service("/static", ServeDir::new(static_dir))
}
