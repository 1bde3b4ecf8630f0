use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Pledge;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header Stripe signs webhook deliveries with.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ============ Checkout sessions ============

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// A created checkout session the donor should be sent to.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// URLs and labels shared by every checkout session this server creates.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub campaign_name: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    settings: CheckoutSettings,
}

impl StripeClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.stripe_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.stripe_api_base.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
            settings: CheckoutSettings {
                success_url: config.success_url.clone(),
                cancel_url: config.cancel_url.clone(),
                campaign_name: config.campaign_name.clone(),
            },
        })
    }

    /// Create a hosted checkout session for a validated pledge.
    ///
    /// One call, bounded by the client timeout, never retried.
    pub async fn create_checkout_session(&self, pledge: &Pledge) -> Result<CheckoutSession> {
        let params = checkout_session_params(pledge, &self.settings);

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<StripeErrorResponse>(&body) {
                Ok(err) => {
                    tracing::debug!("Stripe error type: {:?}", err.error.error_type);
                    err.error
                        .message
                        .unwrap_or_else(|| format!("request failed with status {}", status))
                }
                Err(_) => format!("request failed with status {}", status),
            };
            return Err(AppError::PaymentProvider(message));
        }

        let session: CreateSessionResponse = response.json().await.map_err(|e| {
            AppError::PaymentProviderUnavailable(format!("Failed to parse Stripe response: {}", e))
        })?;

        let url = session.url.ok_or_else(|| {
            AppError::PaymentProviderUnavailable("Stripe returned a session without a URL".into())
        })?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

/// Form parameters for `POST /v1/checkout/sessions`.
///
/// One line item carries the whole pledge amount; recurring pledges become a
/// subscription billed at that amount every interval.
pub fn checkout_session_params(
    pledge: &Pledge,
    settings: &CheckoutSettings,
) -> Vec<(String, String)> {
    let pledge_id = pledge.id.to_string();
    let mode = if pledge.frequency.is_recurring() {
        "subscription"
    } else {
        "payment"
    };

    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), mode.into()),
        ("success_url".into(), settings.success_url.clone()),
        ("cancel_url".into(), settings.cancel_url.clone()),
        ("client_reference_id".into(), pledge_id.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        (
            "line_items[0][price_data][currency]".into(),
            pledge.currency.to_string(),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            pledge.amount_minor.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            pledge.product_name(&settings.campaign_name),
        ),
    ];

    if let Some(interval) = pledge.frequency.interval() {
        params.push((
            "line_items[0][price_data][recurring][interval]".into(),
            interval.into(),
        ));
    }

    let metadata = [
        ("pledge_id", pledge_id),
        ("units", pledge.units.to_string()),
        ("donor_name", pledge.donor_name.clone()),
        ("frequency", pledge.frequency.to_string()),
    ];
    // Copied onto the subscription / payment intent so invoice events carry it too
    let nested = if pledge.frequency.is_recurring() {
        "subscription_data"
    } else {
        "payment_intent_data"
    };
    for (key, value) in &metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
        params.push((format!("{}[metadata][{}]", nested, key), value.clone()));
    }

    if let Some(email) = &pledge.donor_email {
        params.push(("customer_email".into(), email.clone()));
    }

    params
}

// ============ Webhooks ============

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing stripe-signature header")]
    MissingHeader,

    #[error("Malformed stripe-signature header: {0}")]
    MalformedHeader(&'static str),

    #[error("Webhook timestamp outside the tolerance window")]
    TimestampOutsideTolerance,

    #[error("Webhook signature does not match payload")]
    SignatureMismatch,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Pledge details echoed back by Stripe in object metadata.
#[derive(Debug, Default, Deserialize)]
pub struct PledgeMetadata {
    pub pledge_id: Option<String>,
    pub units: Option<String>,
    pub donor_name: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub metadata: PledgeMetadata,
    pub customer_email: Option<String>,
    pub payment_status: Option<String>,
    /// Set for one-time pledges
    pub payment_intent: Option<String>,
    /// Set for weekly/monthly pledges
    pub subscription: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

/// Invoices from API version 2025-03-31 on carry the subscription under
/// `parent.subscription_details`; older versions use the top-level fields.
#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    pub billing_reason: Option<String>,
    pub parent: Option<StripeInvoiceParent>,
    pub subscription: Option<String>,
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoiceParent {
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionDetails {
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: PledgeMetadata,
}

impl StripeInvoice {
    fn parent_details(&self) -> Option<&StripeSubscriptionDetails> {
        self.parent.as_ref()?.subscription_details.as_ref()
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.parent_details()
            .and_then(|d| d.subscription.as_deref())
            .or(self.subscription.as_deref())
    }

    pub fn pledge_metadata(&self) -> Option<&PledgeMetadata> {
        self.parent_details()
            .or(self.subscription_details.as_ref())
            .map(|d| &d.metadata)
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: PledgeMetadata,
}

/// Checks `stripe-signature` headers against the endpoint's signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify the signature of `payload` and parse it into an event.
    pub fn construct_event(
        &self,
        payload: &[u8],
        header: &str,
    ) -> std::result::Result<StripeWebhookEvent, WebhookError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())?;
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    /// Verify `header` against `payload` as of Unix time `now`.
    ///
    /// Header format: `t=<unix>,v1=<hex>[,v1=<hex>...]`. Entries for other
    /// schemes are ignored. Any matching `v1` is accepted.
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> std::result::Result<(), WebhookError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => {
                    if timestamp.replace(t).is_some() {
                        return Err(WebhookError::MalformedHeader("duplicate timestamp"));
                    }
                }
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader("missing timestamp"))?;
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::MalformedHeader("timestamp is not a number"))?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader("missing v1 signature"));
        }

        if now.abs_diff(ts) > self.tolerance.as_secs() {
            return Err(WebhookError::TimestampOutsideTolerance);
        }

        let expected = self.compute_signature(timestamp, payload);
        let matched = signatures.iter().any(|sig| match hex::decode(sig) {
            Ok(bytes) => bool::from(bytes.as_slice().ct_eq(expected.as_slice())),
            Err(_) => false,
        });

        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    fn compute_signature(&self, timestamp: &str, payload: &[u8]) -> Vec<u8> {
        hmac_sha256(&self.secret, timestamp, payload)
    }
}

/// Build a `stripe-signature` header value for `payload`, as Stripe would.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let ts = timestamp.to_string();
    let signature = hex::encode(hmac_sha256(secret, &ts, payload));
    format!("t={},v1={}", ts, signature)
}

fn hmac_sha256(secret: &str, timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}
