use axum::{extract::State, http::HeaderMap, response::Redirect};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::extractors::{Form, Json};
use crate::models::PledgeForm;
use crate::payments::CheckoutSession;
use crate::state::AppState;
use crate::util::{append_query_params, client_ip};

const ERROR_PAGE: &str = "/error";

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Stripe-hosted page the browser should be sent to
    pub url: String,
    pub session_id: String,
}

/// JSON entry point used by the pledge form's script.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<PledgeForm>,
) -> Result<Json<CheckoutResponse>> {
    let session = start_checkout(&state, &headers, &form).await?;

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

/// Plain HTML form post: redirects to checkout, or to the error page with a
/// readable message.
pub async fn submit_pledge_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: std::result::Result<Form<PledgeForm>, AppError>,
) -> Redirect {
    let result = match form {
        Ok(Form(form)) => start_checkout(&state, &headers, &form).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(session) => Redirect::to(&session.url),
        Err(e) => {
            e.log();
            let message = e.public_message();
            Redirect::to(&append_query_params(ERROR_PAGE, &[("message", &message)]))
        }
    }
}

async fn start_checkout(
    state: &AppState,
    headers: &HeaderMap,
    form: &PledgeForm,
) -> Result<CheckoutSession> {
    let pledge = form.validate(&state.pledge_limits())?;
    let ip = client_ip(headers);

    tracing::info!(
        pledge_id = %pledge.id,
        units = pledge.units,
        frequency = %pledge.frequency,
        currency = %pledge.currency,
        amount = pledge.amount_minor,
        client_ip = ?ip,
        "Creating checkout session"
    );

    let session = state.stripe.create_checkout_session(&pledge).await?;

    tracing::info!(
        "Checkout session created: session={}, pledge={}",
        session.id,
        pledge.id
    );

    Ok(session)
}
