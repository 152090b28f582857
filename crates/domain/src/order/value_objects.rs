//! Value objects for the order domain.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted customer or product identifier.
pub const IDENTIFIER_MIN_LEN: usize = 3;
/// Longest accepted customer or product identifier.
pub const IDENTIFIER_MAX_LEN: usize = 50;
/// Largest quantity a single order line may carry.
pub const MAX_QUANTITY: u32 = 10_000;
/// Largest unit price, in cents.
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000;

/// Errors raised when constructing a value object from raw input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{0}")]
    InvalidIdentifier(String),

    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount cannot have more than 2 decimal places: {0}")]
    TooManyDecimalPlaces(Decimal),

    #[error("Cannot combine {left} and {right} amounts")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("Amount out of range")]
    Overflow,

    #[error("Quantity must be between 1 and {MAX_QUANTITY}, got {0}")]
    InvalidQuantity(i64),

    #[error("Unit price must be greater than 0 and at most $10,000, got {0}")]
    InvalidUnitPrice(Money),
}

/// Checks an identifier against the shared length and charset rules.
///
/// `label` is the human name used in messages ("Customer ID", "Product ID").
/// A blank value yields only the "required" message.
pub fn identifier_violations(label: &str, value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return vec![format!("{label} is required")];
    }

    let mut violations = Vec::new();
    let len = value.chars().count();
    if !(IDENTIFIER_MIN_LEN..=IDENTIFIER_MAX_LEN).contains(&len) {
        violations.push(format!(
            "{label} must be between {IDENTIFIER_MIN_LEN} and {IDENTIFIER_MAX_LEN} characters"
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        violations.push(format!(
            "{label} can only contain letters, numbers, hyphens, and underscores"
        ));
    }
    violations
}

fn parse_identifier(label: &str, value: &str) -> Result<String, ValueError> {
    match identifier_violations(label, value).into_iter().next() {
        Some(message) => Err(ValueError::InvalidIdentifier(message)),
        None => Ok(value.to_string()),
    }
}

/// Customer identifier: 3 to 50 characters of `[A-Za-z0-9-_]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerId(String);

impl CustomerId {
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        parse_identifier("Customer ID", value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CustomerId {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CustomerId> for String {
    fn from(id: CustomerId) -> Self {
        id.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Product identifier (SKU), same rules as [`CustomerId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        parse_identifier("Product ID", value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProductId {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO currency of a [`Money`] amount.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Aud,
    Nzd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Aud => "AUD",
            Currency::Nzd => "NZD",
        }
    }

    pub fn parse(code: &str) -> Result<Self, ValueError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "AUD" => Ok(Currency::Aud),
            "NZD" => Ok(Currency::Nzd),
            _ => Err(ValueError::UnknownCurrency(code.to_string())),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Non-negative money amount held in cents, so every value has exactly two
/// fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr")]
pub struct Money {
    cents: i64,
    currency: Currency,
}

/// Wire shape of [`Money`], checked before it becomes one.
#[derive(Deserialize)]
struct MoneyRepr {
    cents: i64,
    #[serde(default)]
    currency: Currency,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = ValueError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        if repr.cents < 0 {
            return Err(ValueError::NegativeAmount(Decimal::new(repr.cents, 2)));
        }
        Ok(Self::from_cents_in(repr.cents, repr.currency))
    }
}

impl Money {
    /// Creates a USD amount from cents.
    ///
    /// Negative input is clamped to zero; use [`Money::from_decimal`] for
    /// checked construction from external input.
    pub fn from_cents(cents: i64) -> Self {
        Self::from_cents_in(cents, Currency::Usd)
    }

    pub fn from_cents_in(cents: i64, currency: Currency) -> Self {
        Self {
            cents: cents.max(0),
            currency,
        }
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self::from_cents(dollars.saturating_mul(100))
    }

    /// Converts a decimal amount, rejecting negatives and sub-cent precision.
    ///
    /// Trailing zeros are ignored, so `5.000` is accepted as `5.00`.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Result<Self, ValueError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValueError::NegativeAmount(amount));
        }
        let normalized = amount.normalize();
        if normalized.scale() > 2 {
            return Err(ValueError::TooManyDecimalPlaces(amount));
        }
        let cents = normalized
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|c| i64::try_from(c).ok())
            .ok_or(ValueError::Overflow)?;
        Ok(Self { cents, currency })
    }

    pub fn zero() -> Self {
        Self::from_cents(0)
    }

    pub fn zero_in(currency: Currency) -> Self {
        Self::from_cents_in(0, currency)
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// The amount as a decimal with scale 2.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.cents, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, ValueError> {
        self.same_currency(other)?;
        let cents = self
            .cents
            .checked_add(other.cents)
            .ok_or(ValueError::Overflow)?;
        Ok(Money { cents, ..*self })
    }

    /// Subtracts `other`, rejecting a negative result.
    pub fn checked_sub(&self, other: Money) -> Result<Money, ValueError> {
        self.same_currency(other)?;
        let cents = self.cents - other.cents;
        if cents < 0 {
            return Err(ValueError::NegativeAmount(Decimal::new(cents, 2)));
        }
        Ok(Money { cents, ..*self })
    }

    pub fn multiply(&self, quantity: u32) -> Result<Money, ValueError> {
        let cents = self
            .cents
            .checked_mul(i64::from(quantity))
            .ok_or(ValueError::Overflow)?;
        Ok(Money { cents, ..*self })
    }

    fn same_currency(&self, other: Money) -> Result<(), ValueError> {
        if self.currency != other.currency {
            return Err(ValueError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.currency {
            Currency::Usd => write!(f, "${}.{:02}", self.cents / 100, self.cents % 100),
            other => write!(f, "{}.{:02} {}", self.cents / 100, self.cents % 100, other),
        }
    }
}

/// A validated order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn try_new(
        product_id: ProductId,
        quantity: i64,
        unit_price: Money,
    ) -> Result<Self, ValueError> {
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| (1..=MAX_QUANTITY).contains(q))
            .ok_or(ValueError::InvalidQuantity(quantity))?;
        if unit_price.is_zero() || unit_price.cents() > MAX_UNIT_PRICE_CENTS {
            return Err(ValueError::InvalidUnitPrice(unit_price));
        }
        Ok(Self {
            product_id,
            quantity,
            unit_price,
        })
    }

    /// Returns quantity × unit price.
    pub fn total_price(&self) -> Result<Money, ValueError> {
        self.unit_price.multiply(self.quantity)
    }
}
