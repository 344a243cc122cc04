/*!
 * # Metrics Module
 *
 * Prometheus counters for the procurement and approval engine, exposed in
 * text format at `/metrics`.
 */

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ORDER_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "purchase_order_transitions_total",
            "Purchase order status transitions"
        ),
        &["from", "to"]
    )
    .expect("metric can be created");
    pub static ref ORDER_TRANSITION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "purchase_order_transition_failures_total",
            "Rejected purchase order transitions"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    pub static ref DELIVERY_CONFIRMATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "delivery_confirmations_total",
            "Delivery confirmation writes"
        ),
        &["operation"]
    )
    .expect("metric can be created");
    pub static ref OVER_DELIVERY_REJECTIONS: IntCounter = IntCounter::new(
        "delivery_over_delivery_rejections_total",
        "Delivery writes rejected for exceeding the ordered quantity"
    )
    .expect("metric can be created");
    pub static ref APPROVAL_ACTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("approval_actions_total", "Approval workflow actions"),
        &["action", "outcome"]
    )
    .expect("metric can be created");
    pub static ref STORE_CONFLICT_RETRIES: IntCounter = IntCounter::new(
        "store_conflict_retries_total",
        "Writes re-run after an optimistic concurrency conflict"
    )
    .expect("metric can be created");
    pub static ref NOTIFICATION_FAILURES: IntCounter = IntCounter::new(
        "notification_failures_total",
        "Notifications that failed to dispatch"
    )
    .expect("metric can be created");
}

static REGISTER: Once = Once::new();

/// Registers every collector with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ORDER_TRANSITIONS.clone()),
            Box::new(ORDER_TRANSITION_FAILURES.clone()),
            Box::new(DELIVERY_CONFIRMATIONS.clone()),
            Box::new(OVER_DELIVERY_REJECTIONS.clone()),
            Box::new(APPROVAL_ACTIONS.clone()),
            Box::new(STORE_CONFLICT_RETRIES.clone()),
            Box::new(NOTIFICATION_FAILURES.clone()),
        ];
        for collector in collectors {
            if let Err(err) = REGISTRY.register(collector) {
                warn!(error = %err, "failed to register metric");
            }
        }
    });
}

/// Renders the registry in Prometheus text format.
pub fn render() -> String {
    register_metrics();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub async fn metrics_handler() -> impl axum::response::IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_counters() {
        ORDER_TRANSITIONS.with_label_values(&["draft", "sent"]).inc();
        OVER_DELIVERY_REJECTIONS.inc();
        let text = render();
        assert!(text.contains("purchase_order_transitions_total"));
        assert!(text.contains("delivery_over_delivery_rejections_total"));
    }
}
