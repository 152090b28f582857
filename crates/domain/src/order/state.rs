//! Order lifecycle state machine.

use serde::{Deserialize, Serialize};

use super::OrderEvent;

/// The state of an order in its lifecycle.
///
/// ```text
/// Received ──► ValidationStarted ──► Validated ──► Enriched ──► Confirmed ──► Delivered
///                     │                  │  │          │  │
///                     │                  │  └──────────┼──┴──► Cancelled
///                     └──────────────────┴─────────────┴─────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Received,
    ValidationStarted,
    Validated,
    Enriched,
    Confirmed,
    Cancelled,
    Failed,
    /// Reachable only from `Confirmed`.
    Delivered,
}

impl OrderState {
    /// The state reached by applying `event` to an order in `from`.
    ///
    /// `from` is `None` for an order with an empty log. Returns `None` when
    /// the event is not a legal transition from that state.
    pub fn transition(from: Option<OrderState>, event: &OrderEvent) -> Option<OrderState> {
        use OrderEvent as E;
        use OrderState as S;

        match (from, event) {
            (None, E::OrderCreated(_)) => Some(S::Received),
            (Some(S::Received), E::OrderValidationStarted(_)) => Some(S::ValidationStarted),
            (Some(S::ValidationStarted), E::OrderValidated(_)) => Some(S::Validated),
            (Some(S::Validated), E::OrderEnriched(_)) => Some(S::Enriched),
            (Some(S::Enriched), E::OrderConfirmed(_)) => Some(S::Confirmed),
            (Some(S::Validated | S::Enriched), E::OrderCancelled(_)) => Some(S::Cancelled),
            (Some(S::ValidationStarted | S::Validated | S::Enriched), E::OrderFailed(_)) => {
                Some(S::Failed)
            }
            (Some(S::Confirmed), E::OrderDelivered(_)) => Some(S::Delivered),
            _ => None,
        }
    }

    /// True once the order has a final confirm/cancel/fail outcome.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderState::Confirmed
                | OrderState::Cancelled
                | OrderState::Failed
                | OrderState::Delivered
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Cancelled | OrderState::Failed | OrderState::Delivered
        )
    }

    /// Position along the happy path, used to detect stale redeliveries.
    pub fn rank(&self) -> u8 {
        match self {
            OrderState::Received => 0,
            OrderState::ValidationStarted => 1,
            OrderState::Validated => 2,
            OrderState::Enriched => 3,
            OrderState::Confirmed | OrderState::Cancelled | OrderState::Failed => 4,
            OrderState::Delivered => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Received => "Received",
            OrderState::ValidationStarted => "ValidationStarted",
            OrderState::Validated => "Validated",
            OrderState::Enriched => "Enriched",
            OrderState::Confirmed => "Confirmed",
            OrderState::Cancelled => "Cancelled",
            OrderState::Failed => "Failed",
            OrderState::Delivered => "Delivered",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
