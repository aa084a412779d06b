//! Prometheus metrics for wagers and the cleanup job

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    /// Stale game settlements by action (refund, force_loss, conflict, failed)
    pub settlements_total: IntCounterVec,
    pub refunded_points_total: IntCounter,
    /// Completed wagers by game and result
    pub wagers_total: IntCounterVec,
    /// Rejected wagers by reason code
    pub wager_rejections_total: IntCounterVec,
    pub cleanup_runs_total: IntCounterVec,
    pub cleanup_duration_seconds: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("pointvault".to_string()), None)?;

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Stale game settlements by action"),
            &["action"],
        )?;
        let refunded_points_total =
            IntCounter::new("refunded_points_total", "Points returned by timeout refunds")?;
        let wagers_total = IntCounterVec::new(
            Opts::new("wagers_total", "Settled wagers by game and result"),
            &["game", "result"],
        )?;
        let wager_rejections_total = IntCounterVec::new(
            Opts::new("wager_rejections_total", "Rejected wagers by reason code"),
            &["code"],
        )?;
        let cleanup_runs_total = IntCounterVec::new(
            Opts::new("cleanup_runs_total", "Cleanup job runs by outcome"),
            &["status"],
        )?;
        let cleanup_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("cleanup_duration_seconds", "Wall time of one cleanup run")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )?;

        registry.register(Box::new(settlements_total.clone()))?;
        registry.register(Box::new(refunded_points_total.clone()))?;
        registry.register(Box::new(wagers_total.clone()))?;
        registry.register(Box::new(wager_rejections_total.clone()))?;
        registry.register(Box::new(cleanup_runs_total.clone()))?;
        registry.register(Box::new(cleanup_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            settlements_total,
            refunded_points_total,
            wagers_total,
            wager_rejections_total,
            cleanup_runs_total,
            cleanup_duration_seconds,
        })
    }

    pub fn record_settlement(&self, action: &str, refunded: i64) {
        self.settlements_total.with_label_values(&[action]).inc();
        if refunded > 0 {
            self.refunded_points_total.inc_by(refunded as u64);
        }
    }

    pub fn record_wager(&self, game: &str, result: &str) {
        self.wagers_total.with_label_values(&[game, result]).inc();
    }

    pub fn record_rejection(&self, code: &str) {
        self.wager_rejections_total.with_label_values(&[code]).inc();
    }

    pub fn record_cleanup_run(&self, success: bool, elapsed: Duration) {
        let status = if success { "ok" } else { "error" };
        self.cleanup_runs_total.with_label_values(&[status]).inc();
        self.cleanup_duration_seconds.observe(elapsed.as_secs_f64());
    }

    /// Text exposition format for the `/metrics` endpoint
    pub fn to_prometheus_format(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_recorded_values() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_settlement("refund", 150);
        metrics.record_wager("roulette", "win");
        metrics.record_rejection("MIN_BET_NOT_MET");
        metrics.record_cleanup_run(true, Duration::from_millis(20));

        let text = metrics.to_prometheus_format();
        assert!(text.contains("pointvault_refunded_points_total 150"));
        assert!(text.contains("pointvault_settlements_total{action=\"refund\"} 1"));
        assert!(text.contains("MIN_BET_NOT_MET"));
    }
}
