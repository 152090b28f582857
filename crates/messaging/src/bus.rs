//! Publish/subscribe contract.
//!
//! Delivery is at-least-once: a handler may see the same event more than
//! once and must treat a repeat as a no-op. Ordering holds within a topic
//! only.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HandlerError, Result};
use crate::event::IntegrationEvent;

/// A consumer bound to one topic.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dead-letter records.
    fn name(&self) -> &str;

    async fn handle(&self, event: &IntegrationEvent) -> std::result::Result<(), HandlerError>;
}

/// Sees every event published on a bus, before delivery.
pub trait BusObserver: Send + Sync {
    fn on_publish(&self, topic: &str, event: &IntegrationEvent);
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, event: &IntegrationEvent) -> Result<()>;

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()>;
}

/// Convenience methods over any [`MessageBus`].
#[async_trait]
pub trait MessageBusExt: MessageBus {
    /// Publishes on the event's default topic.
    async fn publish_event(&self, event: &IntegrationEvent) -> Result<()> {
        self.publish(event.topic(), event).await
    }
}

impl<T: MessageBus + ?Sized> MessageBusExt for T {}

#[async_trait]
impl<B: MessageBus + ?Sized> MessageBus for Arc<B> {
    async fn publish(&self, topic: &str, event: &IntegrationEvent) -> Result<()> {
        (**self).publish(topic, event).await
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        (**self).subscribe(topic, handler).await
    }
}
