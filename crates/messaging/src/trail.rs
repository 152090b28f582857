use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use common::CorrelationId;

use crate::bus::BusObserver;
use crate::event::IntegrationEvent;

/// Records every published event by correlation id, so the full trail of an
/// order can be reconstructed.
#[derive(Debug, Default)]
pub struct CorrelationTrail {
    trails: Mutex<HashMap<CorrelationId, Vec<IntegrationEvent>>>,
}

impl CorrelationTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen for `correlation_id`, in publication order.
    pub fn trail(&self, correlation_id: &CorrelationId) -> Vec<IntegrationEvent> {
        self.trails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(correlation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The `eventType` tags of a trail, handy for assertions and logs.
    pub fn event_types(&self, correlation_id: &CorrelationId) -> Vec<&'static str> {
        self.trail(correlation_id)
            .iter()
            .map(IntegrationEvent::event_type)
            .collect()
    }

    pub fn correlation_ids(&self) -> Vec<CorrelationId> {
        self.trails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl BusObserver for CorrelationTrail {
    fn on_publish(&self, _topic: &str, event: &IntegrationEvent) {
        self.trails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.correlation_id().clone())
            .or_default()
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::event::{IntegrationPayload, OrderCancelledData, OrderDeliveredData};

    #[test]
    fn test_trail_groups_by_correlation_id() {
        let trail = CorrelationTrail::new();
        let a = CorrelationId::new();
        let b = CorrelationId::new();

        let delivered = IntegrationEvent::new(
            IntegrationPayload::OrderDelivered(OrderDeliveredData {
                order_id: "ORD-A".to_string(),
                delivered_at: Utc::now(),
            }),
            "courier",
            a.clone(),
        );
        let cancelled = IntegrationEvent::new(
            IntegrationPayload::OrderCancelled(OrderCancelledData {
                order_id: "ORD-B".to_string(),
                reason: "customer".to_string(),
                cancelled_at: Utc::now(),
            }),
            "api",
            b.clone(),
        );

        trail.on_publish("x", &delivered);
        trail.on_publish("y", &cancelled);

        assert_eq!(trail.event_types(&a), vec!["OrderDeliveredEvent"]);
        assert_eq!(trail.event_types(&b), vec!["OrderCancelledEvent"]);
        assert_eq!(trail.correlation_ids().len(), 2);
        assert!(trail.trail(&CorrelationId::new()).is_empty());
    }
}
