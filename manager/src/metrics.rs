//! # Prometheus Metrics
//!
//! Operational metrics for the account manager, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! prefixed `lumen_`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Metric handles shared by the API handlers and CLI commands.
#[derive(Clone)]
pub struct ManagerMetrics {
    registry: Registry,
    /// Completed operations by `operation` and `outcome` (`ok` or an error kind).
    pub operations_total: IntCounterVec,
    /// Wall-clock time of each operation, network round trips included.
    pub operation_duration_seconds: HistogramVec,
    /// Tracked slots that currently hold a record.
    pub accounts_present: IntGauge,
    /// Open WebSocket subscriptions.
    pub ws_clients: IntGauge,
}

impl ManagerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("lumen".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Account operations by kind and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Account operation latency in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        let accounts_present = IntGauge::new(
            "accounts_present",
            "Tracked slots that currently hold an account record",
        )?;
        registry.register(Box::new(accounts_present.clone()))?;

        let ws_clients = IntGauge::new("ws_clients", "Connected WebSocket subscribers")?;
        registry.register(Box::new(ws_clients.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_duration_seconds,
            accounts_present,
            ws_clients,
        })
    }

    /// Records one finished operation.
    pub fn observe(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<ManagerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_operations_show_up_in_exposition() {
        let metrics = ManagerMetrics::new().unwrap();
        metrics.observe("fund", "ok", Duration::from_millis(120));
        metrics.observe("fund", "funding_failed", Duration::from_millis(40));
        metrics.accounts_present.set(2);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"lumen_operations_total{operation="fund",outcome="ok"} 1"#));
        assert!(text.contains(r#"outcome="funding_failed""#));
        assert!(text.contains("lumen_accounts_present 2"));
        assert!(text.contains("lumen_operation_duration_seconds_count{operation=\"fund\"} 2"));
    }
}
