//! Wiring of the pipeline, its collaborators and the in-process bus.

use std::path::Path;
use std::sync::Arc;

use common::{CorrelationId, OrderId};
use domain::{InMemoryOrderRecordStore, OrderPayload};
use event_store::EventStore;
use messaging::{DispatchReport, InMemoryMessageBus};
use serde_json::json;
use workflow::enrichment::{
    CUSTOMERS_COLLECTION, DEFAULT_DELIVERY_KEY, DELIVERY_COLLECTION, PRODUCTS_COLLECTION,
};
use workflow::{
    CustomerProfileSource, DeliveryDataSource, DocumentStore, EnrichmentSource,
    InMemoryDocumentStore, InMemorySupplierGateway, LogNotifier, Notifier, OrderPipeline,
    ProductCatalogSource, subscribe_stages,
};

use crate::config::Config;
use crate::error::{Result, WorkerError};

/// Source system recorded for orders read from `ORDERS_FILE`.
pub const FILE_SOURCE_SYSTEM: &str = "orders-file";

/// A running pipeline with its bus and collaborators.
pub struct Worker<S: EventStore> {
    bus: InMemoryMessageBus,
    pipeline: Arc<OrderPipeline<S>>,
    documents: InMemoryDocumentStore,
}

impl<S: EventStore + 'static> Worker<S> {
    /// Builds the pipeline over `store` and subscribes its stages, logging
    /// escalations.
    pub async fn start(store: S, config: &Config) -> Result<Self> {
        Self::start_with_notifier(store, config, Arc::new(LogNotifier)).await
    }

    pub async fn start_with_notifier(
        store: S,
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let bus = InMemoryMessageBus::new();
        let documents = InMemoryDocumentStore::new();
        seed_catalog(&documents).await;

        let lookup: Arc<dyn DocumentStore> = Arc::new(documents.clone());
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![
            Arc::new(ProductCatalogSource::new(lookup.clone())),
            Arc::new(CustomerProfileSource::new(lookup.clone())),
            Arc::new(DeliveryDataSource::new(lookup)),
        ];

        let pipeline = Arc::new(OrderPipeline::new(
            store,
            Arc::new(InMemoryOrderRecordStore::new()),
            Arc::new(bus.clone()),
            sources,
            Arc::new(InMemorySupplierGateway::new()),
            config.pipeline_config(),
        ));
        subscribe_stages(&bus, pipeline.clone(), notifier).await?;

        Ok(Self {
            bus,
            pipeline,
            documents,
        })
    }

    pub fn pipeline(&self) -> &OrderPipeline<S> {
        &self.pipeline
    }

    pub fn bus(&self) -> &InMemoryMessageBus {
        &self.bus
    }

    pub fn documents(&self) -> &InMemoryDocumentStore {
        &self.documents
    }

    /// Accepts one order under a fresh correlation id.
    pub async fn submit(&self, payload: OrderPayload, source_system: &str) -> Result<OrderId> {
        let correlation_id = CorrelationId::new();
        Ok(self
            .pipeline
            .receive(payload, source_system, &correlation_id)
            .await?)
    }

    /// Reads a JSON array of order payloads and submits each one.
    pub async fn ingest_file(&self, path: &Path) -> Result<Vec<OrderId>> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkerError::OrdersFile {
                path: path.to_path_buf(),
                source,
            })?;
        let payloads: Vec<OrderPayload> = serde_json::from_str(&raw)?;

        let mut order_ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            order_ids.push(self.submit(payload, FILE_SOURCE_SYSTEM).await?);
        }
        tracing::info!(path = %path.display(), count = order_ids.len(), "ingested orders file");
        Ok(order_ids)
    }

    /// Sends anything left in the pipeline's outbox, drains the bus and
    /// reports what happened. Dead letters are logged and then dropped.
    pub async fn dispatch(&self) -> DispatchReport {
        let unsent = self.pipeline.flush_outbox().await;
        if unsent > 0 {
            tracing::warn!(unsent, "bus refused queued events, retrying next dispatch");
        }

        let report = self.bus.dispatch_until_idle().await;
        if report.delivered > 0 || !report.is_clean() {
            tracing::info!(
                delivered = report.delivered,
                redelivered = report.redelivered,
                dead_lettered = report.dead_lettered,
                fatal = report.fatal.len(),
                "dispatch finished"
            );
        }
        for fatal in &report.fatal {
            tracing::error!(
                order_id = %fatal.order_id,
                event_type = fatal.event_type,
                handler = %fatal.handler,
                error = %fatal.error,
                "undeliverable event"
            );
        }
        for dead in self.bus.drain_dead_letters().await {
            tracing::warn!(
                topic = %dead.topic,
                handler = %dead.handler,
                reason = dead.reason.as_str(),
                attempts = dead.attempts,
                error = %dead.error,
                body = %dead.body,
                "dead letter"
            );
        }
        workflow::metrics::component_health("bus", report.fatal.is_empty() && unsent == 0);
        report
    }
}

/// Loads the demo catalogue: three products from two suppliers, two
/// customers and a default delivery arrangement.
pub async fn seed_catalog(documents: &InMemoryDocumentStore) {
    let products = [
        ("WIDGET-001", "Widget", "ACME", 2),
        ("GADGET-002", "Gadget", "ACME", 5),
        ("SPROCKET-003", "Sprocket", "Globex", 14),
    ];
    for (id, name, supplier, lead_time_days) in products {
        documents
            .insert(
                PRODUCTS_COLLECTION,
                id,
                json!({ "name": name, "supplier": supplier, "lead_time_days": lead_time_days }),
            )
            .await;
    }

    let customers = [
        ("CUST-001", "Ada Lovelace", "ada@example.com", "Standard", "5000.00"),
        ("CUST-VIP", "Grace Hopper", "grace@example.com", "Platinum", "250000.00"),
    ];
    for (id, name, email, tier, credit_limit) in customers {
        documents
            .insert(
                CUSTOMERS_COLLECTION,
                id,
                json!({
                    "name": name,
                    "email": email,
                    "tier": tier,
                    "credit_limit": credit_limit,
                    "current_balance": "0.00"
                }),
            )
            .await;
    }

    documents
        .insert(
            DELIVERY_COLLECTION,
            DEFAULT_DELIVERY_KEY,
            json!({
                "method": "Ground",
                "carrier": "Parcelnet",
                "cost": "9.95",
                "estimated_days": 3
            }),
        )
        .await;
}
