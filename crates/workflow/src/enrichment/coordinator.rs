//! Fan-out over enrichment sources, with per-source timeout and retry.
//!
//! Successful answers are merged into one map, followed by the totals
//! derived from the order itself.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::Value;

use rust_decimal::Decimal;

use super::{EnrichmentRequest, EnrichmentSource, SourceError, WARNINGS_KEY};
use crate::metrics as pipeline_metrics;
use crate::retry::{RetryPolicy, RetryResult, retry_on_transient};

/// Which sources must succeed, and how long each call may take.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentPolicy {
    pub required_sources: BTreeSet<String>,
    /// Bound on a single attempt against a source.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            required_sources: BTreeSet::from([super::ProductCatalogSource::NAME.to_string()]),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

impl EnrichmentPolicy {
    pub fn is_required(&self, source: &str) -> bool {
        self.required_sources.contains(source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    /// Every required source answered. `degraded` lists optional sources
    /// that did not; each also has an entry under [`WARNINGS_KEY`].
    Enriched {
        data: BTreeMap<String, Value>,
        degraded: Vec<SourceFailure>,
    },
    /// A required source failed. `partial` holds what the other sources
    /// returned, for escalation context.
    RequiredSourceUnavailable {
        failure: SourceFailure,
        partial: BTreeMap<String, Value>,
    },
}

/// Fans a request out to every source and merges the answers.
pub struct EnrichmentCoordinator {
    sources: Vec<Arc<dyn EnrichmentSource>>,
    policy: EnrichmentPolicy,
}

impl EnrichmentCoordinator {
    pub fn new(sources: Vec<Arc<dyn EnrichmentSource>>, policy: EnrichmentPolicy) -> Self {
        Self { sources, policy }
    }

    pub fn policy(&self) -> &EnrichmentPolicy {
        &self.policy
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn enrich(&self, request: &EnrichmentRequest) -> EnrichmentOutcome {
        let results = join_all(
            self.sources
                .iter()
                .map(|source| self.call_source(source.as_ref(), request)),
        )
        .await;

        let mut data = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut degraded = Vec::new();
        let mut required_failure = None;

        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(fields) => {
                    for (key, value) in fields {
                        match value {
                            Value::Array(list) if key == WARNINGS_KEY => warnings.extend(list),
                            value => {
                                data.insert(key, value);
                            }
                        }
                    }
                }
                Err(failure) if self.policy.is_required(source.name()) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %failure.error,
                        attempts = failure.attempts,
                        "required enrichment source unavailable"
                    );
                    if required_failure.is_none() {
                        required_failure = Some(failure);
                    }
                }
                Err(failure) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %failure.error,
                        "optional enrichment source failed, continuing with less data"
                    );
                    warnings.push(Value::String(format!(
                        "{} enrichment failed: {}",
                        failure.source, failure.error
                    )));
                    degraded.push(failure);
                }
            }
        }

        if !warnings.is_empty() {
            data.insert(WARNINGS_KEY.to_string(), Value::Array(warnings));
        }

        if let Some(failure) = required_failure {
            return EnrichmentOutcome::RequiredSourceUnavailable {
                failure,
                partial: data,
            };
        }

        data.insert(
            "item_count".to_string(),
            Value::from(request.order.items.len()),
        );
        if let Ok(subtotal) = request.order.total() {
            let subtotal = subtotal.to_decimal();
            let delivery_cost = data
                .get("delivery_cost")
                .and_then(Value::as_str)
                .and_then(|cost| cost.parse::<Decimal>().ok());
            if let Some(cost) = delivery_cost {
                data.insert(
                    "estimated_total".to_string(),
                    Value::String((subtotal + cost).to_string()),
                );
            }
            data.insert("subtotal".to_string(), Value::String(subtotal.to_string()));
        }

        EnrichmentOutcome::Enriched { data, degraded }
    }

    async fn call_source(
        &self,
        source: &dyn EnrichmentSource,
        request: &EnrichmentRequest,
    ) -> Result<BTreeMap<String, Value>, SourceFailure> {
        let timeout = self.policy.timeout;
        let outcome = retry_on_transient(&self.policy.retry, |_attempt| async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, source.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(timeout)),
            };
            let label = match &result {
                Ok(_) => "success",
                Err(SourceError::Timeout(_)) => "timeout",
                Err(_) => "error",
            };
            pipeline_metrics::external_call(source.name(), label, started.elapsed());
            result
        })
        .await;

        let attempts = outcome.attempts();
        match outcome {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Exhausted { error, .. } | RetryResult::Permanent { error, .. } => {
                Err(SourceFailure {
                    source: source.name().to_string(),
                    error,
                    attempts,
                })
            }
        }
    }
}
