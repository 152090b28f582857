//! Worker configuration loaded from environment variables.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use domain::{Currency, Money};
use rust_decimal::Decimal;
use workflow::enrichment::ProductCatalogSource;
use workflow::{EnrichmentPolicy, EscalationMode, EscalationPolicy, PipelineConfig, RetryPolicy};

use crate::error::{Result, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Worker configuration with defaults for every setting.
///
/// Reads from environment variables:
/// - `SERVICE_NAME`: source name on published events (default `order-workflow`)
/// - `METRICS_PORT`: Prometheus listener port (default `9000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL event store; in-memory when unset
/// - `HIGH_VALUE_THRESHOLD`: escalation amount in dollars (default `10000.00`)
/// - `ESCALATION_TIERS`: comma-separated tiers (default `Premium,Platinum,Gold`)
/// - `ESCALATION_MODE`: `any` or `all` (default `any`)
/// - `REQUIRED_ENRICHMENT_SOURCES`: comma-separated (default `product_catalog`)
/// - `ENRICHMENT_TIMEOUT_MS`: per-attempt source timeout (default `2000`)
/// - `RETRY_MAX_ATTEMPTS`: attempts for retried calls (default `3`)
/// - `RETRY_INITIAL_DELAY_MS`: first backoff delay (default `100`)
/// - `ORDERS_FILE`: JSON array of order payloads ingested at startup
/// - `DISPATCH_INTERVAL_MS`: how often the bus is drained (default `1000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub metrics_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub high_value_threshold: Money,
    pub escalation_tiers: BTreeSet<String>,
    pub escalation_mode: EscalationMode,
    pub required_sources: BTreeSet<String>,
    pub enrichment_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_initial_delay: Duration,
    pub orders_file: Option<PathBuf>,
    pub dispatch_interval: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or blank values. Present but malformed values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let log_format = match get("LOG_FORMAT") {
            None => defaults.log_format,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "text" | "pretty" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(WorkerError::config(
                        "LOG_FORMAT",
                        format!("expected text or json, got {other}"),
                    ));
                }
            },
        };

        let high_value_threshold = match get("HIGH_VALUE_THRESHOLD") {
            None => defaults.high_value_threshold,
            Some(value) => {
                let amount = Decimal::from_str(value.trim())
                    .map_err(|e| WorkerError::config("HIGH_VALUE_THRESHOLD", e.to_string()))?;
                Money::from_decimal(amount, Currency::Usd)
                    .map_err(|e| WorkerError::config("HIGH_VALUE_THRESHOLD", e.to_string()))?
            }
        };

        let escalation_mode = match get("ESCALATION_MODE") {
            None => defaults.escalation_mode,
            Some(value) => EscalationMode::parse(&value).ok_or_else(|| {
                WorkerError::config("ESCALATION_MODE", format!("expected any or all, got {value}"))
            })?,
        };

        let retry_max_attempts: u32 =
            parse(&get, "RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?;
        if retry_max_attempts == 0 {
            return Err(WorkerError::config("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }
        let dispatch_interval = millis(&get, "DISPATCH_INTERVAL_MS", defaults.dispatch_interval)?;
        if dispatch_interval.is_zero() {
            return Err(WorkerError::config("DISPATCH_INTERVAL_MS", "must be positive"));
        }

        Ok(Self {
            service_name: get("SERVICE_NAME").unwrap_or(defaults.service_name),
            metrics_port: parse(&get, "METRICS_PORT", defaults.metrics_port)?,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: get("DATABASE_URL"),
            high_value_threshold,
            escalation_tiers: get("ESCALATION_TIERS")
                .map(|value| split_list(&value))
                .unwrap_or(defaults.escalation_tiers),
            escalation_mode,
            required_sources: get("REQUIRED_ENRICHMENT_SOURCES")
                .map(|value| split_list(&value))
                .unwrap_or(defaults.required_sources),
            enrichment_timeout: millis(&get, "ENRICHMENT_TIMEOUT_MS", defaults.enrichment_timeout)?,
            retry_max_attempts,
            retry_initial_delay: millis(
                &get,
                "RETRY_INITIAL_DELAY_MS",
                defaults.retry_initial_delay,
            )?,
            orders_file: get("ORDERS_FILE").map(PathBuf::from),
            dispatch_interval,
        })
    }

    /// The library-level settings for the order pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let retry = RetryPolicy::new(self.retry_max_attempts, self.retry_initial_delay);
        PipelineConfig {
            source: self.service_name.clone(),
            retry: retry.clone(),
            enrichment: EnrichmentPolicy {
                required_sources: self.required_sources.clone(),
                timeout: self.enrichment_timeout,
                retry,
            },
            escalation: EscalationPolicy {
                threshold: self.high_value_threshold,
                tiers: self.escalation_tiers.clone(),
                mode: self.escalation_mode,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let escalation = EscalationPolicy::default();
        Self {
            service_name: "order-workflow".to_string(),
            metrics_port: 9000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            high_value_threshold: escalation.threshold,
            escalation_tiers: escalation.tiers,
            escalation_mode: escalation.mode,
            required_sources: BTreeSet::from([ProductCatalogSource::NAME.to_string()]),
            enrichment_timeout: Duration::from_millis(2000),
            retry_max_attempts: 3,
            retry_initial_delay: Duration::from_millis(100),
            orders_file: None,
            dispatch_interval: Duration::from_millis(1000),
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| WorkerError::config(key, e.to_string())),
    }
}

fn millis(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse(get, key, default_ms).map(Duration::from_millis)
}

fn split_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.service_name, "order-workflow");
        assert_eq!(config.metrics_port, 9000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.high_value_threshold, Money::from_dollars(10_000));
        assert_eq!(config.escalation_mode, EscalationMode::Any);
        assert!(config.required_sources.contains("product_catalog"));
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.enrichment_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SERVICE_NAME", "orders-eu"),
            ("LOG_FORMAT", "JSON"),
            ("HIGH_VALUE_THRESHOLD", "2500.50"),
            ("ESCALATION_TIERS", "Gold, Diamond ,"),
            ("ESCALATION_MODE", "all"),
            ("REQUIRED_ENRICHMENT_SOURCES", "product_catalog,customer_profile"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("ORDERS_FILE", "/tmp/orders.json"),
        ])
        .unwrap();

        assert_eq!(config.service_name, "orders-eu");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.high_value_threshold, Money::from_cents(250_050));
        assert_eq!(
            config.escalation_tiers,
            BTreeSet::from(["Diamond".to_string(), "Gold".to_string()])
        );
        assert_eq!(config.escalation_mode, EscalationMode::All);
        assert_eq!(config.required_sources.len(), 2);
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.orders_file, Some(PathBuf::from("/tmp/orders.json")));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("METRICS_PORT", "  "), ("DATABASE_URL", "")]).unwrap();
        assert_eq!(config.metrics_port, 9000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = load(&[("HIGH_VALUE_THRESHOLD", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Config {
                key: "HIGH_VALUE_THRESHOLD",
                ..
            }
        ));

        assert!(load(&[("ESCALATION_MODE", "sometimes")]).is_err());
        assert!(load(&[("METRICS_PORT", "70000")]).is_err());
        assert!(load(&[("RETRY_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("HIGH_VALUE_THRESHOLD", "10.005")]).is_err());
        assert!(load(&[("DISPATCH_INTERVAL_MS", "0")]).is_err());
    }

    #[test]
    fn test_pipeline_config_carries_policies() {
        let config = load(&[
            ("SERVICE_NAME", "orders-eu"),
            ("ENRICHMENT_TIMEOUT_MS", "750"),
            ("RETRY_INITIAL_DELAY_MS", "20"),
        ])
        .unwrap();

        let pipeline = config.pipeline_config();

        assert_eq!(pipeline.source, "orders-eu");
        assert_eq!(pipeline.enrichment.timeout, Duration::from_millis(750));
        assert_eq!(pipeline.retry.initial_delay, Duration::from_millis(20));
        assert_eq!(pipeline.enrichment.retry.max_attempts, 3);
        assert_eq!(pipeline.escalation.threshold, Money::from_dollars(10_000));
    }
}
