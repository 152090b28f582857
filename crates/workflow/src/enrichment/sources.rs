//! Sources backed by a [`DocumentStore`]: product catalogue, customer
//! profiles and delivery options.
//!
//! Conditions worth a human look but not worth failing the order over are
//! returned as a string list under [`WARNINGS_KEY`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use serde_json::Value;

use super::{DocumentStore, EnrichmentRequest, EnrichmentSource, SourceError, WARNINGS_KEY};
use crate::escalation::DEFAULT_TIER;

pub const PRODUCTS_COLLECTION: &str = "products";
pub const CUSTOMERS_COLLECTION: &str = "customers";
pub const DELIVERY_COLLECTION: &str = "delivery";

/// Delivery document used when a customer has no arrangement of their own.
pub const DEFAULT_DELIVERY_KEY: &str = "default";

/// Whole days from today (UTC) until `date`. Negative for past dates.
fn days_until(date: NaiveDate) -> i64 {
    (date - Utc::now().date_naive()).num_days()
}

/// Reads a decimal written either as a JSON string or a number.
fn decimal_field(doc: &Value, name: &str) -> Option<Decimal> {
    match doc.get(name)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn insert_warnings(data: &mut BTreeMap<String, Value>, warnings: Vec<String>) {
    if !warnings.is_empty() {
        data.insert(
            WARNINGS_KEY.to_string(),
            Value::Array(warnings.into_iter().map(Value::String).collect()),
        );
    }
}

/// Product and supplier data, one document per product id.
///
/// Adds `product_{id}` for every distinct product and `supplier` from the
/// first product that names one. A product whose `lead_time_days` does not
/// fit before the requested delivery date produces a warning.
pub struct ProductCatalogSource {
    store: Arc<dyn DocumentStore>,
}

impl ProductCatalogSource {
    pub const NAME: &'static str = "product_catalog";

    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EnrichmentSource for ProductCatalogSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<BTreeMap<String, Value>, SourceError> {
        let mut seen = BTreeSet::new();
        let product_ids: Vec<&str> = request
            .order
            .items
            .iter()
            .map(|item| item.product_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();

        let documents = try_join_all(product_ids.iter().map(|id| async move {
            self.store
                .get(PRODUCTS_COLLECTION, id)
                .await?
                .map(|doc| (*id, doc))
                .ok_or_else(|| SourceError::NotFound(format!("product {id}")))
        }))
        .await?;

        let requested_days = request.order.delivery_date.map(days_until);
        let mut warnings = Vec::new();
        let mut data = BTreeMap::new();
        let supplier = documents
            .iter()
            .find_map(|(_, doc)| doc.get("supplier").and_then(Value::as_str))
            .map(str::to_string);
        if let Some(supplier) = supplier {
            data.insert("supplier".to_string(), Value::String(supplier));
        }
        for (id, doc) in documents {
            let lead_time = doc.get("lead_time_days").and_then(Value::as_i64);
            if let (Some(lead_time), Some(requested)) = (lead_time, requested_days)
                && requested < lead_time
            {
                warnings.push(format!(
                    "Product {id} requires {lead_time} days lead time, \
                     but delivery is requested in {requested} days"
                ));
            }
            data.insert(format!("product_{id}"), doc);
        }
        insert_warnings(&mut data, warnings);
        Ok(data)
    }
}

/// Customer profile: name, email, service tier and credit limit.
///
/// When the profile carries a `credit_limit`, an order that would push
/// `current_balance` past it produces a warning.
pub struct CustomerProfileSource {
    store: Arc<dyn DocumentStore>,
}

impl CustomerProfileSource {
    pub const NAME: &'static str = "customer_profile";

    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EnrichmentSource for CustomerProfileSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<BTreeMap<String, Value>, SourceError> {
        let customer_id = request.order.customer_id.as_str();
        let profile = self
            .store
            .get(CUSTOMERS_COLLECTION, customer_id)
            .await?
            .ok_or_else(|| SourceError::NotFound(format!("customer {customer_id}")))?;

        let field = |name: &str| profile.get(name).and_then(Value::as_str);

        let mut data = BTreeMap::new();
        if let Some(name) = field("name") {
            data.insert("customer_name".to_string(), Value::from(name));
        }
        if let Some(email) = field("email") {
            data.insert("customer_email".to_string(), Value::from(email));
        }
        data.insert(
            "customer_tier".to_string(),
            Value::from(field("tier").unwrap_or(DEFAULT_TIER)),
        );

        let mut warnings = Vec::new();
        if let Some(limit) = decimal_field(&profile, "credit_limit") {
            data.insert("credit_limit".to_string(), Value::String(limit.to_string()));
            let balance = decimal_field(&profile, "current_balance").unwrap_or_default();
            if let Ok(total) = request.order.total()
                && balance + total.to_decimal() > limit
            {
                warnings.push(format!(
                    "Order total {} would exceed customer credit limit",
                    total.to_decimal()
                ));
            }
        }
        insert_warnings(&mut data, warnings);
        Ok(data)
    }
}

/// Delivery method, cost and carrier for orders with a requested delivery
/// date.
///
/// Looks up the customer's own arrangement first, then
/// [`DEFAULT_DELIVERY_KEY`]. Orders without a delivery date get nothing. A
/// carrier slower than the requested date produces a warning.
pub struct DeliveryDataSource {
    store: Arc<dyn DocumentStore>,
}

impl DeliveryDataSource {
    pub const NAME: &'static str = "delivery";

    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn arrangement(&self, customer_id: &str) -> Result<Option<Value>, SourceError> {
        match self.store.get(DELIVERY_COLLECTION, customer_id).await? {
            Some(doc) => Ok(Some(doc)),
            None => self.store.get(DELIVERY_COLLECTION, DEFAULT_DELIVERY_KEY).await,
        }
    }
}

#[async_trait]
impl EnrichmentSource for DeliveryDataSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<BTreeMap<String, Value>, SourceError> {
        let Some(delivery_date) = request.order.delivery_date else {
            return Ok(BTreeMap::new());
        };
        let customer_id = request.order.customer_id.as_str();
        let doc = self
            .arrangement(customer_id)
            .await?
            .ok_or_else(|| SourceError::NotFound(format!("delivery for {customer_id}")))?;

        let mut data = BTreeMap::new();
        for (from, to) in [("method", "delivery_method"), ("carrier", "delivery_carrier")] {
            if let Some(value) = doc.get(from).and_then(Value::as_str) {
                data.insert(to.to_string(), Value::from(value));
            }
        }
        if let Some(cost) = decimal_field(&doc, "cost") {
            data.insert("delivery_cost".to_string(), Value::String(cost.to_string()));
        }

        let mut warnings = Vec::new();
        if let Some(days) = doc.get("estimated_days").and_then(Value::as_i64) {
            data.insert("delivery_estimated_days".to_string(), Value::from(days));
            let requested = days_until(delivery_date);
            if requested < days {
                let carrier = doc.get("carrier").and_then(Value::as_str).unwrap_or("carrier");
                warnings.push(format!(
                    "Delivery by {carrier} takes {days} days, \
                     but delivery is requested in {requested} days"
                ));
            }
        }
        insert_warnings(&mut data, warnings);
        Ok(data)
    }
}
