use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::error::{AppError, Result};
use crate::payments::{
    SIGNATURE_HEADER, StripeCheckoutSession, StripeInvoice, StripeSubscription,
    StripeWebhookEvent, WebhookError,
};
use crate::state::AppState;

/// Receive a Stripe event: verify, log, acknowledge.
///
/// Nothing is stored, so redelivered events only repeat their log line.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str)> {
    let Some(verifier) = &state.webhook_verifier else {
        tracing::warn!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not set");
        return Ok((StatusCode::OK, "Webhook endpoint not yet configured."));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .ok_or(WebhookError::MissingHeader)?
        .to_str()
        .map_err(|_| WebhookError::MalformedHeader("not valid ASCII"))?;

    let event = verifier.construct_event(&body, signature)?;

    match event.event_type.as_str() {
        "checkout.session.completed" => log_checkout_completed(&event)?,
        "invoice.paid" => log_invoice_paid(&event)?,
        "invoice.payment_failed" => log_invoice_payment_failed(&event)?,
        "customer.subscription.deleted" => log_subscription_deleted(&event)?,
        other => {
            tracing::debug!(event_id = %event.id, event_type = %other, "Stripe event ignored");
        }
    }

    Ok((StatusCode::OK, "OK"))
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &StripeWebhookEvent) -> Result<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        AppError::BadRequest(format!(
            "Invalid {} object in event {}: {}",
            event.event_type, event.id, e
        ))
    })
}

fn log_checkout_completed(event: &StripeWebhookEvent) -> Result<()> {
    let session: StripeCheckoutSession = parse_object(event)?;
    let metadata = &session.metadata;

    tracing::info!(
        event_id = %event.id,
        session_id = %session.id,
        pledge_id = ?metadata.pledge_id,
        donor_name = ?metadata.donor_name,
        units = ?metadata.units,
        frequency = ?metadata.frequency,
        payment_status = ?session.payment_status,
        payment_intent = ?session.payment_intent,
        subscription = ?session.subscription,
        amount_total = ?session.amount_total,
        currency = ?session.currency,
        customer_email = ?session.customer_email,
        "Pledge completed"
    );
    Ok(())
}

fn log_invoice_paid(event: &StripeWebhookEvent) -> Result<()> {
    let invoice: StripeInvoice = parse_object(event)?;
    let metadata = invoice.pledge_metadata();

    tracing::info!(
        event_id = %event.id,
        invoice_id = %invoice.id,
        subscription = ?invoice.subscription_id(),
        billing_reason = ?invoice.billing_reason,
        amount_paid = ?invoice.amount_paid,
        currency = ?invoice.currency,
        pledge_id = ?metadata.and_then(|m| m.pledge_id.as_deref()),
        donor_name = ?metadata.and_then(|m| m.donor_name.as_deref()),
        "Recurring pledge payment received"
    );
    Ok(())
}

fn log_invoice_payment_failed(event: &StripeWebhookEvent) -> Result<()> {
    let invoice: StripeInvoice = parse_object(event)?;

    tracing::warn!(
        event_id = %event.id,
        invoice_id = %invoice.id,
        subscription = ?invoice.subscription_id(),
        "Recurring pledge payment failed; Stripe will retry per its dunning settings"
    );
    Ok(())
}

fn log_subscription_deleted(event: &StripeWebhookEvent) -> Result<()> {
    let subscription: StripeSubscription = parse_object(event)?;

    tracing::info!(
        event_id = %event.id,
        subscription = %subscription.id,
        status = ?subscription.status,
        pledge_id = ?subscription.metadata.pledge_id,
        "Recurring pledge cancelled"
    );
    Ok(())
}
