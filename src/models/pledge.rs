use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;
use uuid::Uuid;

/// Smallest charge accepted for currencies with two decimal places (one major unit).
const MIN_MINOR_AMOUNT: u64 = 100;
/// Smallest charge accepted for zero-decimal currencies.
const MIN_ZERO_DECIMAL_AMOUNT: u64 = 1;
/// Stripe's ceiling for a single amount, in minor units.
const MAX_MINOR_AMOUNT: u64 = 100_000_000;
const MAX_DONOR_NAME_LEN: usize = 200;
const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PledgeError {
    #[error("Units must be between 1 and {max}.")]
    UnitsOutOfRange { max: u32 },

    #[error("Unsupported payment frequency: {0}")]
    InvalidFrequency(String),

    #[error("Unsupported currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Donor name must be at most 200 characters.")]
    DonorNameTooLong,

    #[error("Amount out of allowed range.")]
    AmountOutOfRange,
}

/// How often a pledge is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display, EnumIter)]
pub enum Frequency {
    #[strum(to_string = "once", serialize = "one-time", serialize = "one_time")]
    #[serde(rename = "once")]
    Once,
    #[strum(to_string = "weekly")]
    #[serde(rename = "weekly")]
    Weekly,
    #[strum(to_string = "monthly")]
    #[serde(rename = "monthly")]
    Monthly,
}

impl Frequency {
    pub fn parse(raw: &str) -> Result<Self, PledgeError> {
        raw.trim()
            .to_lowercase()
            .parse()
            .map_err(|_| PledgeError::InvalidFrequency(raw.to_string()))
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Frequency::Once)
    }

    /// Stripe `recurring[interval]` value, None for a single charge.
    pub fn interval(&self) -> Option<&'static str> {
        match self {
            Frequency::Once => None,
            Frequency::Weekly => Some("week"),
            Frequency::Monthly => Some("month"),
        }
    }
}

/// Currencies a donor may pledge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Cad,
    Eur,
    Gbp,
    Aud,
    Jpy,
}

impl Currency {
    pub fn parse(raw: &str) -> Result<Self, PledgeError> {
        raw.trim()
            .to_lowercase()
            .parse()
            .map_err(|_| PledgeError::InvalidCurrency(raw.to_string()))
    }

    /// Currencies whose smallest unit is the major unit (no cents).
    pub fn is_zero_decimal(&self) -> bool {
        matches!(self, Currency::Jpy)
    }

    /// Convert a whole-unit amount into the currency's smallest unit,
    /// enforcing the per-charge bounds.
    pub fn to_minor_units(&self, major: u64) -> Result<u64, PledgeError> {
        let (minor, floor) = if self.is_zero_decimal() {
            (Some(major), MIN_ZERO_DECIMAL_AMOUNT)
        } else {
            (major.checked_mul(100), MIN_MINOR_AMOUNT)
        };

        match minor {
            Some(amount) if (floor..=MAX_MINOR_AMOUNT).contains(&amount) => Ok(amount),
            _ => Err(PledgeError::AmountOutOfRange),
        }
    }
}

/// Pricing and inventory limits a pledge is validated against.
#[derive(Debug, Clone, Copy)]
pub struct PledgeLimits {
    /// Price of one unit in whole currency units
    pub unit_price: u64,
    pub total_units: u32,
}

/// Raw pledge input, as submitted by the form or its script.
#[derive(Debug, Default, Deserialize)]
pub struct PledgeForm {
    #[serde(default, deserialize_with = "number_or_string")]
    pub units: Option<i64>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "name")]
    pub donor_name: Option<String>,
    #[serde(default, alias = "email")]
    pub donor_email: Option<String>,
}

/// A validated pledge, ready to be turned into a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pledge {
    pub id: Uuid,
    pub units: u32,
    pub frequency: Frequency,
    pub currency: Currency,
    pub donor_name: String,
    pub donor_email: Option<String>,
    /// Charged per cycle (or once), in the currency's smallest unit
    pub amount_minor: u64,
}

impl PledgeForm {
    pub fn validate(&self, limits: &PledgeLimits) -> Result<Pledge, PledgeError> {
        let units = self.units.unwrap_or(1);
        if units < 1 || units > i64::from(limits.total_units) {
            return Err(PledgeError::UnitsOutOfRange {
                max: limits.total_units,
            });
        }
        let units = units as u32;

        let frequency = match non_empty(&self.frequency) {
            Some(raw) => Frequency::parse(raw)?,
            None => Frequency::Once,
        };
        let currency = match non_empty(&self.currency) {
            Some(raw) => Currency::parse(raw)?,
            None => Currency::Usd,
        };

        let donor_name = non_empty(&self.donor_name).unwrap_or(ANONYMOUS);
        if donor_name.chars().count() > MAX_DONOR_NAME_LEN {
            return Err(PledgeError::DonorNameTooLong);
        }

        let donor_email = match non_empty(&self.donor_email) {
            Some(email) if is_plausible_email(email) => Some(email.to_string()),
            Some(email) => return Err(PledgeError::InvalidEmail(email.to_string())),
            None => None,
        };

        let total = u64::from(units)
            .checked_mul(limits.unit_price)
            .ok_or(PledgeError::AmountOutOfRange)?;
        let amount_minor = currency.to_minor_units(total)?;

        Ok(Pledge {
            id: Uuid::new_v4(),
            units,
            frequency,
            currency,
            donor_name: donor_name.to_string(),
            donor_email,
            amount_minor,
        })
    }
}

impl Pledge {
    /// Product name shown on the hosted checkout page.
    pub fn product_name(&self, campaign: &str) -> String {
        format!("{} - {} Unit(s)", campaign, self.units)
    }
}

/// Options the pledge form offers, served to its script.
#[derive(Debug, Serialize)]
pub struct PledgeOptions {
    pub unit_price: u64,
    pub total_units: u32,
    pub frequencies: Vec<Frequency>,
    pub currencies: Vec<Currency>,
}

impl PledgeOptions {
    pub fn new(limits: &PledgeLimits) -> Self {
        Self {
            unit_price: limits.unit_price,
            total_units: limits.total_units,
            frequencies: Frequency::iter().collect(),
            currencies: Currency::iter().collect(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Basic shape check only; Stripe does the real validation.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// HTML forms post numbers as strings; the form script posts JSON numbers.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("units must be a whole number, got {:?}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: PledgeLimits = PledgeLimits {
        unit_price: 1000,
        total_units: 80,
    };

    fn form(units: i64, frequency: &str, currency: &str) -> PledgeForm {
        PledgeForm {
            units: Some(units),
            frequency: Some(frequency.into()),
            currency: Some(currency.into()),
            donor_name: Some("Amina".into()),
            donor_email: Some("amina@example.org".into()),
        }
    }

    #[test]
    fn test_monthly_usd_pledge_amount() {
        let pledge = form(3, "monthly", "USD").validate(&LIMITS).unwrap();
        assert_eq!(pledge.units, 3);
        assert_eq!(pledge.frequency, Frequency::Monthly);
        assert_eq!(pledge.currency, Currency::Usd);
        assert_eq!(pledge.amount_minor, 300_000);
    }

    #[test]
    fn test_zero_decimal_currency_is_not_scaled() {
        let pledge = form(2, "once", "jpy").validate(&LIMITS).unwrap();
        assert_eq!(pledge.amount_minor, 2000);
    }

    #[test]
    fn test_amount_scales_with_units_and_price() {
        for units in [1, 7, 80] {
            let pledge = form(units, "weekly", "eur").validate(&LIMITS).unwrap();
            assert_eq!(pledge.amount_minor, units as u64 * 1000 * 100);
        }
    }

    #[test]
    fn test_units_bounds() {
        assert_eq!(
            form(0, "once", "usd").validate(&LIMITS),
            Err(PledgeError::UnitsOutOfRange { max: 80 })
        );
        assert_eq!(
            form(-2, "once", "usd").validate(&LIMITS),
            Err(PledgeError::UnitsOutOfRange { max: 80 })
        );
        assert_eq!(
            form(81, "once", "usd").validate(&LIMITS),
            Err(PledgeError::UnitsOutOfRange { max: 80 })
        );
    }

    #[test]
    fn test_amount_ceiling() {
        let limits = PledgeLimits {
            unit_price: 2_000_000,
            total_units: 80,
        };
        assert_eq!(
            form(1, "once", "usd").validate(&limits),
            Err(PledgeError::AmountOutOfRange)
        );
    }

    #[test]
    fn test_frequency_spellings() {
        assert_eq!(Frequency::parse("once").unwrap(), Frequency::Once);
        assert_eq!(Frequency::parse("One-Time").unwrap(), Frequency::Once);
        assert_eq!(Frequency::parse("one_time").unwrap(), Frequency::Once);
        assert_eq!(Frequency::parse(" WEEKLY ").unwrap(), Frequency::Weekly);
        assert_eq!(
            Frequency::parse("daily"),
            Err(PledgeError::InvalidFrequency("daily".into()))
        );
    }

    #[test]
    fn test_intervals() {
        assert_eq!(Frequency::Once.interval(), None);
        assert_eq!(Frequency::Weekly.interval(), Some("week"));
        assert_eq!(Frequency::Monthly.interval(), Some("month"));
        assert!(!Frequency::Once.is_recurring());
        assert!(Frequency::Monthly.is_recurring());
    }

    #[test]
    fn test_unknown_currency_rejected() {
        assert_eq!(
            form(1, "once", "xyz").validate(&LIMITS),
            Err(PledgeError::InvalidCurrency("xyz".into()))
        );
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let pledge = PledgeForm::default().validate(&LIMITS).unwrap();
        assert_eq!(pledge.units, 1);
        assert_eq!(pledge.frequency, Frequency::Once);
        assert_eq!(pledge.currency, Currency::Usd);
        assert_eq!(pledge.donor_name, "Anonymous");
        assert_eq!(pledge.donor_email, None);
    }

    #[test]
    fn test_blank_email_is_treated_as_absent() {
        let mut input = form(1, "once", "usd");
        input.donor_email = Some("   ".into());
        assert_eq!(input.validate(&LIMITS).unwrap().donor_email, None);
    }

    #[test]
    fn test_email_shape() {
        for bad in ["no-at-sign", "@example.org", "a@localhost", "a b@example.org", "a@.org"] {
            let mut input = form(1, "once", "usd");
            input.donor_email = Some(bad.into());
            assert!(
                matches!(input.validate(&LIMITS), Err(PledgeError::InvalidEmail(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_donor_name_length() {
        let mut input = form(1, "once", "usd");
        input.donor_name = Some("x".repeat(201));
        assert_eq!(input.validate(&LIMITS), Err(PledgeError::DonorNameTooLong));
    }

    #[test]
    fn test_units_accepts_string_or_number() {
        let from_json: PledgeForm = serde_json::from_str(r#"{"units": 4}"#).unwrap();
        assert_eq!(from_json.units, Some(4));

        let from_text: PledgeForm = serde_json::from_str(r#"{"units": "5"}"#).unwrap();
        assert_eq!(from_text.units, Some(5));

        let blank: PledgeForm = serde_json::from_str(r#"{"units": ""}"#).unwrap();
        assert_eq!(blank.units, None);

        assert!(serde_json::from_str::<PledgeForm>(r#"{"units": "many"}"#).is_err());
    }

    #[test]
    fn test_name_and_email_aliases() {
        let input: PledgeForm =
            serde_json::from_str(r#"{"name": "Yusuf", "email": "y@example.org"}"#).unwrap();
        assert_eq!(input.donor_name.as_deref(), Some("Yusuf"));
        assert_eq!(input.donor_email.as_deref(), Some("y@example.org"));
    }

    #[test]
    fn test_product_name() {
        let pledge = form(3, "monthly", "usd").validate(&LIMITS).unwrap();
        assert_eq!(pledge.product_name("Ramadan Pledge"), "Ramadan Pledge - 3 Unit(s)");
    }

    #[test]
    fn test_options_list_everything() {
        let options = PledgeOptions::new(&LIMITS);
        assert_eq!(options.frequencies.len(), 3);
        assert!(options.currencies.contains(&Currency::Jpy));
    }
}
