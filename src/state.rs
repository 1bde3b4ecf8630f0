use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::models::PledgeLimits;
use crate::payments::{StripeClient, WebhookVerifier};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stripe: StripeClient,
    /// None until STRIPE_WEBHOOK_SECRET is configured
    pub webhook_verifier: Option<WebhookVerifier>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let stripe = StripeClient::new(&config)?;
        let webhook_verifier = config
            .stripe_webhook_secret
            .as_ref()
            .map(|secret| WebhookVerifier::new(secret.clone(), config.webhook_tolerance));

        Ok(Self {
            config: Arc::new(config),
            stripe,
            webhook_verifier,
        })
    }

    pub fn pledge_limits(&self) -> PledgeLimits {
        PledgeLimits {
            unit_price: self.config.unit_price,
            total_units: self.config.total_units,
        }
    }
}
