//! PostgreSQL integration tests for the order event log.
//!
//! A single container is shared by every test; tests are serialised and
//! truncate the table before running.

use std::sync::Arc;

use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreError, EventStoreExt, OrderId,
    PostgresEventStore, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_order_events.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresEventStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventStore::new(pool)
}

fn create_test_event(order_id: &OrderId, version: Version, event_type: &str) -> EventEnvelope {
    EventEnvelope::new(
        order_id.clone(),
        version,
        event_type,
        serde_json::json!({"type": event_type}),
    )
}

#[tokio::test]
#[serial]
async fn append_and_retrieve_events() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    let version = store
        .append(
            vec![
                create_test_event(&order_id, Version::new(1), "OrderCreated"),
                create_test_event(&order_id, Version::new(2), "OrderValidationStarted"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    assert_eq!(version, Version::new(2));

    let events = store.get_events_for_order(&order_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "OrderCreated");
    assert_eq!(events[1].version, Version::new(2));
}

#[tokio::test]
#[serial]
async fn stale_expected_version_is_a_conflict() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store
        .append_event(
            create_test_event(&order_id, Version::first(), "OrderCreated"),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let result = store
        .append_event(
            create_test_event(&order_id, Version::new(2), "OrderValidationStarted"),
            AppendOptions::expect_new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
    assert_eq!(
        store.get_order_version(&order_id).await.unwrap(),
        Some(Version::first())
    );
}

#[tokio::test]
#[serial]
async fn unique_constraint_prevents_duplicate_versions() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store
        .append_event(
            create_test_event(&order_id, Version::first(), "OrderCreated"),
            AppendOptions::new(),
        )
        .await
        .unwrap();

    let result = store
        .append_event(
            create_test_event(&order_id, Version::first(), "OrderCreated"),
            AppendOptions::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
}

#[tokio::test]
#[serial]
async fn read_from_version_and_by_type() {
    let store = get_test_store().await;
    let a = OrderId::new();
    let b = OrderId::new();

    store
        .append(
            vec![
                create_test_event(&a, Version::new(1), "OrderCreated"),
                create_test_event(&a, Version::new(2), "OrderValidationStarted"),
                create_test_event(&a, Version::new(3), "OrderValidated"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    store
        .append_event(
            create_test_event(&b, Version::first(), "OrderCreated"),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let tail = store
        .get_events_for_order_from_version(&a, Version::new(2))
        .await
        .unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].event_type, "OrderValidationStarted");

    let created = store.get_events_by_type("OrderCreated").await.unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].order_id, a);
}

#[tokio::test]
#[serial]
async fn stream_all_events_and_existence() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let order_id = OrderId::new();
    assert!(!store.order_exists(&order_id).await.unwrap());

    store
        .append_event(
            create_test_event(&order_id, Version::first(), "OrderCreated"),
            AppendOptions::new(),
        )
        .await
        .unwrap();

    let events: Vec<_> = store.stream_all_events().await.unwrap().collect().await;
    assert_eq!(events.len(), 1);
    assert!(events.iter().all(|e| e.is_ok()));
    assert!(store.order_exists(&order_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn correlation_metadata_preserved() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    let event = EventEnvelope::new(
        order_id.clone(),
        Version::first(),
        "OrderCreated",
        serde_json::json!({"type": "OrderCreated"}),
    )
    .with_correlation_id("corr-123")
    .with_metadata("source", serde_json::json!("order-workflow"));

    store
        .append_event(event, AppendOptions::new())
        .await
        .unwrap();

    let events = store.get_events_for_order(&order_id).await.unwrap();
    assert_eq!(events[0].correlation_id(), Some("corr-123"));
    assert_eq!(
        events[0].metadata.get("source"),
        Some(&serde_json::json!("order-workflow"))
    );
}
