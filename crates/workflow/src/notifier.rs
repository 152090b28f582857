//! High-priority notification path for escalated failures.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use messaging::HighValueErrorData;
use thiserror::Error;

use crate::retry::IsTransient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),
}

impl IsTransient for NotifyError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Delivers escalations to people. Failures never affect order state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, escalation: &HighValueErrorData) -> Result<(), NotifyError>;
}

/// Writes escalations to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, escalation: &HighValueErrorData) -> Result<(), NotifyError> {
        tracing::warn!(
            order_id = %escalation.order_id,
            customer_id = %escalation.customer_id,
            customer_tier = %escalation.customer_tier,
            order_value = %escalation.order_value,
            stage = %escalation.processing_stage,
            category = %escalation.error_category,
            "high-value order failure: {}",
            escalation.error_message
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<HighValueErrorData>,
    failing: bool,
    attempts: u32,
}

/// Records escalations in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn sent(&self) -> Vec<HighValueErrorData> {
        self.lock().sent.clone()
    }

    /// Calls made, successful or not.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, escalation: &HighValueErrorData) -> Result<(), NotifyError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.failing {
            return Err(NotifyError::Unavailable("notifier offline".to_string()));
        }
        state.sent.push(escalation.clone());
        Ok(())
    }
}
