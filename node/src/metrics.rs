//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped by Prometheus at `/metrics`
//! on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `coinpass` namespace so they do not collide with the default global
//! registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// The handles are cheap to clone and internally synchronized, so one
/// instance is shared by every request handler and the session reaper.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Sessions issued by successful logins.
    pub sessions_issued_total: IntCounter,
    /// Sessions currently held in the credential store.
    pub live_sessions: IntGauge,
    /// Expired sessions removed by the reaper.
    pub sessions_reclaimed_total: IntCounter,
    /// Refused requests, by classification code.
    pub auth_failures_total: IntCounterVec,
    pub coin_transfers_total: IntCounter,
    /// Refused coin transfers, by classification code.
    pub coin_transfer_rejections_total: IntCounterVec,
    /// Refused joins, by classification code.
    pub join_rejections_total: IntCounterVec,
    /// Handler latency, by operation.
    pub operation_duration_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("coinpass".into()), None)?;

        let sessions_issued_total =
            IntCounter::new("sessions_issued_total", "Total number of sessions issued")?;
        registry.register(Box::new(sessions_issued_total.clone()))?;

        let live_sessions = IntGauge::new("live_sessions", "Sessions currently held in memory")?;
        registry.register(Box::new(live_sessions.clone()))?;

        let sessions_reclaimed_total = IntCounter::new(
            "sessions_reclaimed_total",
            "Expired sessions removed by the background reaper",
        )?;
        registry.register(Box::new(sessions_reclaimed_total.clone()))?;

        let auth_failures_total = IntCounterVec::new(
            Opts::new(
                "auth_failures_total",
                "Requests refused before reaching business logic",
            ),
            &["code"],
        )?;
        registry.register(Box::new(auth_failures_total.clone()))?;

        let coin_transfers_total =
            IntCounter::new("coin_transfers_total", "Committed coin transfers")?;
        registry.register(Box::new(coin_transfers_total.clone()))?;

        let coin_transfer_rejections_total = IntCounterVec::new(
            Opts::new(
                "coin_transfer_rejections_total",
                "Coin transfers refused after authentication",
            ),
            &["code"],
        )?;
        registry.register(Box::new(coin_transfer_rejections_total.clone()))?;

        let join_rejections_total = IntCounterVec::new(
            Opts::new("join_rejections_total", "Group joins refused after authentication"),
            &["code"],
        )?;
        registry.register(Box::new(join_rejections_total.clone()))?;

        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Time spent inside the service per request, in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            sessions_issued_total,
            live_sessions,
            sessions_reclaimed_total,
            auth_failures_total,
            coin_transfers_total,
            coin_transfer_rejections_total,
            join_rejections_total,
            operation_duration_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
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
