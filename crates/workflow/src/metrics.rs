//! Metric names and recording helpers for the order workflow.

use std::time::{Duration, Instant};

use domain::OrderState;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers descriptions with the installed recorder.
pub fn describe() {
    describe_counter!("order_transitions_total", "Order state transitions");
    describe_counter!("orders_received_total", "Orders accepted for processing");
    describe_counter!("orders_finished_total", "Orders that reached a settled state");
    describe_gauge!("orders_pending", "Orders received but not yet settled");
    describe_histogram!("order_stage_duration_seconds", "Time spent in a processing stage");
    describe_histogram!(
        "external_call_duration_seconds",
        "Latency of calls to external collaborators"
    );
    describe_counter!("external_calls_total", "Calls to external collaborators");
    describe_counter!("high_value_escalations_total", "High-value error events raised");
    describe_counter!("notifications_failed_total", "Escalation notifications that failed");
    describe_counter!("bus_dead_letters_total", "Messages moved to the dead-letter list");
    describe_counter!(
        "duplicate_deliveries_total",
        "Redelivered messages acknowledged without effect"
    );
    describe_gauge!("outbox_pending", "Integration events waiting to be published");
    describe_gauge!("component_health", "1 when a component is healthy, 0 otherwise");
}

pub fn order_received() {
    counter!("orders_received_total").increment(1);
    gauge!("orders_pending").increment(1.0);
}

/// Counts an order reaching `state` for the first time.
pub fn order_settled(state: OrderState) {
    counter!("orders_finished_total", "outcome" => state.as_str()).increment(1);
    gauge!("orders_pending").decrement(1.0);
}

pub fn stage_duration(stage: &'static str, started: Instant) {
    histogram!("order_stage_duration_seconds", "stage" => stage)
        .record(started.elapsed().as_secs_f64());
}

pub fn external_call(source: &str, outcome: &'static str, elapsed: Duration) {
    let source = source.to_string();
    histogram!("external_call_duration_seconds", "source" => source.clone(), "outcome" => outcome)
        .record(elapsed.as_secs_f64());
    counter!("external_calls_total", "source" => source, "outcome" => outcome).increment(1);
}

pub fn escalation_raised() {
    counter!("high_value_escalations_total").increment(1);
}

pub fn notification_failed() {
    counter!("notifications_failed_total").increment(1);
}

pub fn duplicate_delivery(stage: &'static str) {
    counter!("duplicate_deliveries_total", "stage" => stage).increment(1);
}

pub fn outbox_pending(pending: usize) {
    gauge!("outbox_pending").set(pending as f64);
}

pub fn component_health(component: &'static str, healthy: bool) {
    gauge!("component_health", "component" => component).set(if healthy { 1.0 } else { 0.0 });
}
