/// Metrics collection and exposure

use crate::errors::DaemonResult;
use mediator_core::SessionObserver;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, IntGauge, Registry};
use std::time::Duration;

/// Metrics collector
pub struct MetricsCollector {
    registry: Registry,

    // Session metrics
    pub sessions_total: Counter,
    pub sessions_active: IntGauge,

    // Turn metrics
    pub turns_total: Counter,
    pub turn_failures_total: Counter,
    pub turn_duration: Histogram,
    pub tool_calls_rejected_total: Counter,
    pub events_queued_total: Counter,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let sessions_total = Counter::new("sessions_total", "Total sessions opened")?;
        registry.register(Box::new(sessions_total.clone()))?;

        let sessions_active = IntGauge::new("sessions_active", "Open sessions")?;
        registry.register(Box::new(sessions_active.clone()))?;

        let turns_total = Counter::new("turns_total", "Total agent turns started")?;
        registry.register(Box::new(turns_total.clone()))?;

        let turn_failures_total = Counter::new("turn_failures_total", "Agent turns that failed")?;
        registry.register(Box::new(turn_failures_total.clone()))?;

        let turn_duration = Histogram::with_opts(HistogramOpts::new(
            "turn_duration_seconds",
            "Agent turn duration",
        ))?;
        registry.register(Box::new(turn_duration.clone()))?;

        let tool_calls_rejected_total = Counter::new(
            "tool_calls_rejected_total",
            "Tool calls rejected by validation",
        )?;
        registry.register(Box::new(tool_calls_rejected_total.clone()))?;

        let events_queued_total = Counter::new(
            "events_queued_total",
            "Client events queued behind a running turn",
        )?;
        registry.register(Box::new(events_queued_total.clone()))?;

        Ok(MetricsCollector {
            registry,
            sessions_total,
            sessions_active,
            turns_total,
            turn_failures_total,
            turn_duration,
            tool_calls_rejected_total,
            events_queued_total,
        })
    }

    /// Record a new session
    pub fn record_session_opened(&self) {
        self.sessions_total.inc();
        self.sessions_active.inc();
    }

    /// Record a session closing
    pub fn record_session_closed(&self) {
        self.sessions_active.dec();
    }

    /// Get all metrics in Prometheus text format
    pub fn gather_metrics(&self) -> DaemonResult<String> {
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl SessionObserver for MetricsCollector {
    fn turn_started(&self) {
        self.turns_total.inc();
    }

    fn turn_finished(&self, elapsed: Duration, ok: bool) {
        self.turn_duration.observe(elapsed.as_secs_f64());
        if !ok {
            self.turn_failures_total.inc();
        }
    }

    fn tool_calls_rejected(&self, count: usize) {
        self.tool_calls_rejected_total.inc_by(count as f64);
    }

    fn event_queued(&self) {
        self.events_queued_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gauges() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_session_opened();
        metrics.record_session_opened();
        metrics.record_session_closed();

        assert_eq!(metrics.sessions_total.get(), 2.0);
        assert_eq!(metrics.sessions_active.get(), 1);
    }

    #[test]
    fn test_observer_hooks_feed_counters() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.turn_started();
        metrics.turn_finished(Duration::from_millis(40), false);
        metrics.tool_calls_rejected(3);
        metrics.event_queued();

        assert_eq!(metrics.turns_total.get(), 1.0);
        assert_eq!(metrics.turn_failures_total.get(), 1.0);
        assert_eq!(metrics.tool_calls_rejected_total.get(), 3.0);
        assert_eq!(metrics.events_queued_total.get(), 1.0);
        assert_eq!(metrics.turn_duration.get_sample_count(), 1);
    }

    #[test]
    fn test_gather_metrics_text() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_session_opened();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("sessions_total 1"));
        assert!(text.contains("turn_duration_seconds"));
    }
}
