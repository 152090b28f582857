//! Order validation engine.
//!
//! Validation is a pure function over the raw payload: every rule is
//! evaluated and each violation becomes one message, so callers always get
//! the complete list rather than the first failure.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{
    Currency, CustomerId, MAX_QUANTITY, Money, OrderItem, ProductId, ValueError,
    identifier_violations,
};

/// Most lines a single order may carry.
pub const MAX_ITEMS: usize = 100;
/// Longest accepted notes field, in characters.
pub const MAX_NOTES_LEN: usize = 1000;

fn max_unit_price() -> Decimal {
    Decimal::new(10_000, 0)
}

fn max_order_total() -> Decimal {
    Decimal::new(100_000, 0)
}

/// An order as submitted, before any rule has been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub customer_id: String,

    #[serde(default)]
    pub items: Vec<OrderItemPayload>,

    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemPayload {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl OrderPayload {
    /// Sum of quantity × unit price, or None if it overflows.
    pub fn total_value(&self) -> Option<Decimal> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            Decimal::from(item.quantity)
                .checked_mul(item.unit_price)
                .and_then(|line| total.checked_add(line))
        })
    }
}

/// Outcome of validating one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    is_valid: bool,
    errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// A failed verdict. An empty list is still reported as invalid.
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::valid()
        } else {
            Self::invalid(errors)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Validates against the current UTC date.
pub fn validate_order(payload: &OrderPayload) -> ValidationResult {
    validate_order_on(payload, Utc::now().date_naive())
}

/// Validates a payload, treating `today` as the earliest acceptable delivery date.
pub fn validate_order_on(payload: &OrderPayload, today: NaiveDate) -> ValidationResult {
    let mut errors = identifier_violations("Customer ID", &payload.customer_id);

    if payload.items.is_empty() {
        errors.push("At least one order item is required".to_string());
    } else if payload.items.len() > MAX_ITEMS {
        errors.push(format!("Maximum of {MAX_ITEMS} items allowed per order"));
    }

    for (index, item) in payload.items.iter().enumerate() {
        errors.extend(
            item_violations(item)
                .into_iter()
                .map(|message| format!("Items[{index}]: {message}")),
        );
    }

    if let Some(date) = payload.delivery_date
        && date < today
    {
        errors.push("Delivery date must be in the future".to_string());
    }

    if let Some(notes) = &payload.notes
        && notes.chars().count() > MAX_NOTES_LEN
    {
        errors.push(format!("Notes cannot exceed {MAX_NOTES_LEN} characters"));
    }

    // Runs last and over every item, including ones flagged above.
    if payload
        .total_value()
        .is_none_or(|total| total > max_order_total())
    {
        errors.push("Total order value cannot exceed $100,000".to_string());
    }

    ValidationResult::from_errors(errors)
}

fn item_violations(item: &OrderItemPayload) -> Vec<String> {
    let mut violations = identifier_violations("Product ID", &item.product_id);

    if item.quantity <= 0 {
        violations.push("Quantity must be greater than 0".to_string());
    } else if item.quantity > i64::from(MAX_QUANTITY) {
        violations.push("Quantity cannot exceed 10,000 units".to_string());
    }

    if item.unit_price <= Decimal::ZERO {
        violations.push("Unit price must be greater than 0".to_string());
    } else if item.unit_price > max_unit_price() {
        violations.push("Unit price cannot exceed $10,000".to_string());
    }
    if item.unit_price.normalize().scale() > 2 {
        violations.push("Unit price cannot have more than 2 decimal places".to_string());
    }

    violations
}

/// A payload that passed validation, converted into value objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl ValidatedOrder {
    pub fn from_payload(payload: &OrderPayload) -> Result<Self, ValueError> {
        let items = payload
            .items
            .iter()
            .map(|item| {
                OrderItem::try_new(
                    ProductId::parse(&item.product_id)?,
                    item.quantity,
                    Money::from_decimal(item.unit_price, Currency::Usd)?,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            customer_id: CustomerId::parse(&payload.customer_id)?,
            items,
            delivery_date: payload.delivery_date,
            notes: payload.notes.clone(),
        })
    }

    pub fn total(&self) -> Result<Money, ValueError> {
        self.items.iter().try_fold(Money::zero(), |total, item| {
            total.checked_add(item.total_price()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn item(product_id: &str, quantity: i64, unit_price: Decimal) -> OrderItemPayload {
        OrderItemPayload {
            product_id: product_id.to_string(),
            quantity,
            unit_price,
        }
    }

    fn payload(customer_id: &str, items: Vec<OrderItemPayload>) -> OrderPayload {
        OrderPayload {
            customer_id: customer_id.to_string(),
            items,
            delivery_date: None,
            notes: None,
            customer_email: None,
        }
    }

    fn sample() -> OrderPayload {
        payload(
            "CUST-001",
            vec![
                item("SKU-001", 10, Decimal::new(500, 2)),
                item("SKU-002", 1, Decimal::new(5000, 2)),
            ],
        )
    }

    #[test]
    fn valid_order_has_no_errors() {
        let mut order = sample();
        order.delivery_date = Some(today());
        order.notes = Some("Leave at the back door".to_string());

        let result = validate_order_on(&order, today());
        assert!(result.is_valid());
        assert!(result.errors().is_empty());
    }

    #[test]
    fn short_customer_id_fails_with_length_message() {
        let result = validate_order_on(&payload("ab", sample().items), today());

        assert!(!result.is_valid());
        assert_eq!(
            result.errors(),
            ["Customer ID must be between 3 and 50 characters"]
        );
    }

    #[test]
    fn collects_every_violation() {
        let mut order = payload(
            "",
            vec![
                item("x", 0, Decimal::new(1001, 3)),
                item("SKU-002", 10_001, Decimal::new(10_001, 0)),
            ],
        );
        order.delivery_date = Some(today().pred_opt().unwrap());
        order.notes = Some("n".repeat(1001));

        let result = validate_order_on(&order, today());
        let errors = result.errors();

        assert_eq!(errors[0], "Customer ID is required");
        assert!(errors.contains(&"Items[0]: Product ID must be between 3 and 50 characters".to_string()));
        assert!(errors.contains(&"Items[0]: Quantity must be greater than 0".to_string()));
        assert!(errors.contains(
            &"Items[0]: Unit price cannot have more than 2 decimal places".to_string()
        ));
        assert!(errors.contains(&"Items[1]: Quantity cannot exceed 10,000 units".to_string()));
        assert!(errors.contains(&"Items[1]: Unit price cannot exceed $10,000".to_string()));
        assert!(errors.contains(&"Delivery date must be in the future".to_string()));
        assert!(errors.contains(&"Notes cannot exceed 1000 characters".to_string()));
        assert_eq!(
            errors.last().unwrap(),
            "Total order value cannot exceed $100,000"
        );
    }

    #[test]
    fn total_of_exactly_limit_passes_and_one_cent_over_fails() {
        let at_limit = payload(
            "CUST-001",
            vec![item("SKU-001", 10, Decimal::new(10_000, 0))],
        );
        assert!(validate_order_on(&at_limit, today()).is_valid());

        let over = payload(
            "CUST-001",
            vec![
                item("SKU-001", 10, Decimal::new(10_000, 0)),
                item("SKU-002", 1, Decimal::new(1, 2)),
            ],
        );
        let result = validate_order_on(&over, today());
        assert!(!result.is_valid());
        assert_eq!(result.errors(), ["Total order value cannot exceed $100,000"]);
    }

    #[test]
    fn total_check_runs_even_when_items_are_invalid() {
        let order = payload(
            "CUST-001",
            vec![
                item("SKU-001", 10_001, Decimal::new(10, 0)),
                item("SKU-002", 1, Decimal::new(10_001, 2)),
            ],
        );
        let result = validate_order_on(&order, today());
        assert_eq!(
            result.errors().last().unwrap(),
            "Total order value cannot exceed $100,000"
        );
    }

    #[test]
    fn empty_and_oversized_item_lists() {
        let empty = validate_order_on(&payload("CUST-001", vec![]), today());
        assert_eq!(empty.errors(), ["At least one order item is required"]);

        let many = payload(
            "CUST-001",
            (0..101)
                .map(|i| item(&format!("SKU-{i:03}"), 1, Decimal::ONE))
                .collect(),
        );
        assert_eq!(
            validate_order_on(&many, today()).errors(),
            ["Maximum of 100 items allowed per order"]
        );
    }

    #[test]
    fn trailing_zeros_do_not_count_as_decimal_places() {
        let order = payload("CUST-001", vec![item("SKU-001", 1, Decimal::new(5000, 3))]);
        assert!(validate_order_on(&order, today()).is_valid());
    }

    #[test]
    fn delivery_today_is_accepted() {
        let mut order = sample();
        order.delivery_date = Some(today());
        assert!(validate_order_on(&order, today()).is_valid());
    }

    #[test]
    fn payload_deserializes_from_camel_case_json() {
        let json = serde_json::json!({
            "customerId": "CUST-001",
            "items": [{"productId": "SKU-001", "quantity": 2, "unitPrice": "12.50"}],
            "deliveryDate": "2025-07-01",
            "unknownField": true
        });
        let order: OrderPayload = serde_json::from_value(json).unwrap();
        assert_eq!(order.items[0].unit_price, Decimal::new(1250, 2));
        assert_eq!(order.delivery_date, NaiveDate::from_ymd_opt(2025, 7, 1));
    }

    #[test]
    fn validated_order_total() {
        let order = ValidatedOrder::from_payload(&sample()).unwrap();
        assert_eq!(order.total().unwrap(), Money::from_cents(10_000));
        assert_eq!(sample().total_value(), Some(Decimal::new(10_000, 2)));
    }
}
