//! Downstream acceptance decision for enriched orders.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use thiserror::Error;

use crate::retry::IsTransient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupplierError {
    #[error("Supplier {0} unreachable")]
    Unreachable(String),
}

impl IsTransient for SupplierError {
    fn is_transient(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplierDecision {
    Accepted { confirmation_id: String },
    Declined { reason: String },
}

#[async_trait]
pub trait SupplierGateway: Send + Sync {
    async fn request_confirmation(
        &self,
        order_id: &OrderId,
        supplier_id: &str,
        total: Money,
    ) -> Result<SupplierDecision, SupplierError>;
}

#[derive(Debug, Default)]
struct GatewayState {
    confirmed: u32,
    declining: HashSet<String>,
    unreachable: bool,
}

/// Accepts every order unless the supplier is set to decline. Confirmation
/// ids are `C-1`, `C-2`, ...
#[derive(Debug, Clone, Default)]
pub struct InMemorySupplierGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemorySupplierGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decline_for(&self, supplier_id: &str) {
        self.lock().declining.insert(supplier_id.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn confirmed_count(&self) -> u32 {
        self.lock().confirmed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SupplierGateway for InMemorySupplierGateway {
    async fn request_confirmation(
        &self,
        _order_id: &OrderId,
        supplier_id: &str,
        _total: Money,
    ) -> Result<SupplierDecision, SupplierError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(SupplierError::Unreachable(supplier_id.to_string()));
        }
        if state.declining.contains(supplier_id) {
            return Ok(SupplierDecision::Declined {
                reason: format!("supplier {supplier_id} declined the order"),
            });
        }
        state.confirmed += 1;
        Ok(SupplierDecision::Accepted {
            confirmation_id: format!("C-{}", state.confirmed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_confirmation_ids() {
        let gateway = InMemorySupplierGateway::new();
        let order_id = OrderId::new();

        let first = gateway
            .request_confirmation(&order_id, "ACME", Money::from_dollars(1))
            .await
            .unwrap();
        let second = gateway
            .request_confirmation(&order_id, "ACME", Money::from_dollars(1))
            .await
            .unwrap();

        assert_eq!(
            first,
            SupplierDecision::Accepted {
                confirmation_id: "C-1".to_string()
            }
        );
        assert_eq!(
            second,
            SupplierDecision::Accepted {
                confirmation_id: "C-2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_decline_and_unreachable() {
        let gateway = InMemorySupplierGateway::new();
        gateway.decline_for("Globex");

        let decision = gateway
            .request_confirmation(&OrderId::new(), "Globex", Money::zero())
            .await
            .unwrap();
        assert!(matches!(decision, SupplierDecision::Declined { .. }));

        gateway.set_unreachable(true);
        assert!(
            gateway
                .request_confirmation(&OrderId::new(), "ACME", Money::zero())
                .await
                .is_err()
        );
        assert_eq!(gateway.confirmed_count(), 0);
    }
}
