//! Escalation classifier: decides when a failed order also needs the
//! high-priority notification path.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use common::OrderId;
use domain::Money;
use messaging::HighValueErrorData;
use serde_json::Value;

use crate::error::FailureClass;

/// Tier assumed when the customer profile does not name one.
pub const DEFAULT_TIER: &str = "Standard";

/// How the value and tier criteria combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationMode {
    /// Either a high order value or an escalation tier is enough.
    #[default]
    Any,
    /// Both are required.
    All,
}

impl EscalationMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" | "or" => Some(EscalationMode::Any),
            "all" | "and" => Some(EscalationMode::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationPolicy {
    /// Orders worth strictly more than this are high value.
    pub threshold: Money,
    pub tiers: BTreeSet<String>,
    pub mode: EscalationMode,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            threshold: Money::from_dollars(10_000),
            tiers: ["Premium", "Platinum", "Gold"]
                .into_iter()
                .map(String::from)
                .collect(),
            mode: EscalationMode::Any,
        }
    }
}

impl EscalationPolicy {
    pub fn is_high_value(&self, order_value: Money) -> bool {
        order_value.cents() > self.threshold.cents()
    }

    pub fn is_escalation_tier(&self, tier: &str) -> bool {
        self.tiers.iter().any(|t| t.eq_ignore_ascii_case(tier.trim()))
    }

    pub fn should_escalate(&self, order_value: Money, tier: &str) -> bool {
        let value = self.is_high_value(order_value);
        let tier = self.is_escalation_tier(tier);
        match self.mode {
            EscalationMode::Any => value || tier,
            EscalationMode::All => value && tier,
        }
    }
}

/// Who the order belongs to, as far as the workflow knows at failure time.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerContext {
    pub customer_id: String,
    pub email: Option<String>,
    pub tier: String,
}

impl CustomerContext {
    /// Builds the context from whatever enrichment data is available.
    pub fn from_enrichment(
        customer_id: impl Into<String>,
        submitted_email: Option<&str>,
        data: &BTreeMap<String, Value>,
    ) -> Self {
        let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            customer_id: customer_id.into(),
            email: submitted_email.map(str::to_string).or_else(|| text("customer_email")),
            tier: text("customer_tier").unwrap_or_else(|| DEFAULT_TIER.to_string()),
        }
    }
}

/// A failure that ended an order, with the context escalation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingFailure {
    pub class: FailureClass,
    /// Machine-readable reason recorded on `OrderFailed`.
    pub reason: String,
    pub details: Vec<String>,
    pub technical_details: String,
    pub retry_count: u32,
    pub stage: &'static str,
    pub is_retryable: bool,
}

impl ProcessingFailure {
    pub fn message(&self) -> String {
        if self.details.is_empty() {
            self.reason.clone()
        } else {
            format!("{}: {}", self.reason, self.details.join("; "))
        }
    }
}

/// Returns the escalation event for `failure`, or `None` when the order does
/// not meet the policy. Only validation and infrastructure failures
/// escalate.
pub fn classify(
    policy: &EscalationPolicy,
    order_id: &OrderId,
    order_value: Money,
    customer: &CustomerContext,
    failure: &ProcessingFailure,
) -> Option<HighValueErrorData> {
    if !matches!(
        failure.class,
        FailureClass::ValidationFailure | FailureClass::TransientInfrastructureFailure
    ) {
        return None;
    }
    if !policy.should_escalate(order_value, &customer.tier) {
        return None;
    }

    let context_data = BTreeMap::from([
        ("failureReason".to_string(), Value::from(failure.reason.clone())),
        ("errorDetails".to_string(), Value::from(failure.details.clone())),
        ("isRetryable".to_string(), Value::from(failure.is_retryable)),
        (
            "highValue".to_string(),
            Value::from(policy.is_high_value(order_value)),
        ),
        (
            "escalationTier".to_string(),
            Value::from(policy.is_escalation_tier(&customer.tier)),
        ),
        (
            "threshold".to_string(),
            Value::from(policy.threshold.to_decimal().to_string()),
        ),
    ]);

    Some(HighValueErrorData {
        order_id: order_id.to_string(),
        customer_id: customer.customer_id.clone(),
        customer_email: customer.email.clone().unwrap_or_default(),
        error_category: failure.class.as_str().to_string(),
        error_message: failure.message(),
        technical_details: failure.technical_details.clone(),
        order_value: order_value.to_decimal(),
        customer_tier: customer.tier.clone(),
        error_occurred_at: Utc::now(),
        retry_count: failure.retry_count,
        processing_stage: failure.stage.to_string(),
        context_data,
    })
}
