use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Directory holding index.html, thank-you.html and error.html
    pub static_dir: PathBuf,
    pub stripe_secret_key: String,
    /// None until the webhook endpoint has been registered with Stripe
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_base: String,
    /// Upper bound on a single checkout-session call
    pub stripe_timeout: Duration,
    /// Maximum age (either direction) of a webhook signature timestamp
    pub webhook_tolerance: Duration,
    pub success_url: String,
    pub cancel_url: String,
    /// Price of one pledge unit, in whole currency units
    pub unit_price: u64,
    /// Largest number of units a single pledge may cover
    pub total_units: u32,
    pub campaign_name: String,
}

/// Command-line values that take precedence over HOST and PORT.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(Overrides::default())
    }

    /// Load from the environment, applying `overrides` before any URL is
    /// derived from the host and port.
    pub fn from_env_with(overrides: Overrides) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok(), overrides)
    }

    /// Build a config from any variable source.
    pub fn from_lookup<F>(lookup: F, overrides: Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = overrides
            .host
            .or_else(|| lookup("HOST"))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = match overrides.port {
            Some(port) => port,
            None => lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(4242),
        };

        let base_url = lookup("BASE_URL").unwrap_or_else(|| format!("http://{}:{}", host, port));
        let base_url = base_url.trim_end_matches('/').to_string();

        let stripe_secret_key = lookup("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;

        let stripe_webhook_secret = lookup("STRIPE_WEBHOOK_SECRET").filter(|s| !s.trim().is_empty());

        let unit_price: u64 = parse_var(&lookup, "UNIT_PRICE", 1000)?;
        if unit_price == 0 {
            bail!("UNIT_PRICE must be greater than zero");
        }

        let total_units: u32 = parse_var(&lookup, "TOTAL_UNITS", 80)?;
        if total_units == 0 {
            bail!("TOTAL_UNITS must be greater than zero");
        }

        let stripe_timeout_secs: u64 = parse_var(&lookup, "STRIPE_TIMEOUT_SECS", 10)?;
        if stripe_timeout_secs == 0 {
            bail!("STRIPE_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            host,
            port,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base: lookup("STRIPE_API_BASE")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            stripe_timeout: Duration::from_secs(stripe_timeout_secs),
            webhook_tolerance: Duration::from_secs(parse_var(&lookup, "WEBHOOK_TOLERANCE_SECS", 300)?),
            success_url: lookup("SUCCESS_URL").unwrap_or_else(|| format!("{}/thank-you", base_url)),
            cancel_url: lookup("CANCEL_URL").unwrap_or_else(|| format!("{}/error", base_url)),
            unit_price,
            total_units,
            campaign_name: lookup("CAMPAIGN_NAME").unwrap_or_else(|| "Ramadan Pledge".to_string()),
            base_url,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an optional numeric variable, failing loudly on garbage rather than
/// silently falling back to the default.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got {:?}", name, raw)),
        None => Ok(default),
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("static_dir", &self.static_dir)
            .field("stripe_secret_key", &"[REDACTED]")
            .field(
                "stripe_webhook_secret",
                &self.stripe_webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("stripe_api_base", &self.stripe_api_base)
            .field("stripe_timeout", &self.stripe_timeout)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("unit_price", &self.unit_price)
            .field("total_units", &self.total_units)
            .field("campaign_name", &self.campaign_name)
            .finish()
    }
}
