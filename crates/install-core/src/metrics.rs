//! Metrics sink seam and its Prometheus implementation.

use crate::error::{CoreError, Result};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::time::Duration;

/// Receiver of monitoring and installation metrics
pub trait MetricsSink: Send + Sync {
    /// Duration of one monitor pass over `entity` ("host" / "cluster")
    fn monitor_pass(&self, entity: &str, duration: Duration, monitored: usize);

    /// An entity failed during a monitor pass
    fn monitor_failure(&self, entity: &str);

    /// A validation went from success to failure
    fn validation_failed(&self, entity: &str, validation: &str);

    /// A host left an installation stage after `duration`
    fn host_stage_finished(&self, stage: &str, duration: Duration);

    /// A cluster installation ended with `result` ("installed" / "error" / "cancelled")
    fn cluster_installation_finished(&self, result: &str);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn monitor_pass(&self, _entity: &str, _duration: Duration, _monitored: usize) {}
    fn monitor_failure(&self, _entity: &str) {}
    fn validation_failed(&self, _entity: &str, _validation: &str) {}
    fn host_stage_finished(&self, _stage: &str, _duration: Duration) {}
    fn cluster_installation_finished(&self, _result: &str) {}
}

/// Prometheus-backed metrics
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    monitor_duration: HistogramVec,
    monitored_entities: IntGaugeVec,
    monitor_failures: IntCounterVec,
    validation_failures: IntCounterVec,
    host_stage_duration: HistogramVec,
    installations_finished: IntCounterVec,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

fn registration(e: prometheus::Error) -> CoreError {
    CoreError::Configuration(format!("metric registration failed: {e}"))
}

impl PrometheusMetrics {
    /// Creates the collectors and registers them in a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Creates the collectors and registers them in `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let monitor_duration = HistogramVec::new(
            HistogramOpts::new(
                "install_core_monitor_duration_seconds",
                "Duration of one monitor pass",
            ),
            &["entity"],
        )
        .map_err(registration)?;
        let monitored_entities = IntGaugeVec::new(
            Opts::new("install_core_monitored_entities", "Entities visited by the last monitor pass"),
            &["entity"],
        )
        .map_err(registration)?;
        let monitor_failures = IntCounterVec::new(
            Opts::new("install_core_monitor_failures_total", "Entities that failed during a monitor pass"),
            &["entity"],
        )
        .map_err(registration)?;
        let validation_failures = IntCounterVec::new(
            Opts::new(
                "install_core_validation_failures_total",
                "Validations that changed from success to failure",
            ),
            &["entity", "validation"],
        )
        .map_err(registration)?;
        let host_stage_duration = HistogramVec::new(
            HistogramOpts::new("install_core_host_stage_duration_seconds", "Time hosts spent per installation stage")
                .buckets(vec![30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0]),
            &["stage"],
        )
        .map_err(registration)?;
        let installations_finished = IntCounterVec::new(
            Opts::new(
                "install_core_cluster_installation_finished_total",
                "Cluster installations that reached a final state",
            ),
            &["result"],
        )
        .map_err(registration)?;

        registry.register(Box::new(monitor_duration.clone())).map_err(registration)?;
        registry.register(Box::new(monitored_entities.clone())).map_err(registration)?;
        registry.register(Box::new(monitor_failures.clone())).map_err(registration)?;
        registry.register(Box::new(validation_failures.clone())).map_err(registration)?;
        registry.register(Box::new(host_stage_duration.clone())).map_err(registration)?;
        registry.register(Box::new(installations_finished.clone())).map_err(registration)?;

        Ok(Self {
            registry,
            monitor_duration,
            monitored_entities,
            monitor_failures,
            validation_failures,
            host_stage_duration,
            installations_finished,
        })
    }

    /// Registry holding the collectors, for exposition
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl MetricsSink for PrometheusMetrics {
    fn monitor_pass(&self, entity: &str, duration: Duration, monitored: usize) {
        self.monitor_duration
            .with_label_values(&[entity])
            .observe(duration.as_secs_f64());
        self.monitored_entities
            .with_label_values(&[entity])
            .set(i64::try_from(monitored).unwrap_or(i64::MAX));
    }

    fn monitor_failure(&self, entity: &str) {
        self.monitor_failures.with_label_values(&[entity]).inc();
    }

    fn validation_failed(&self, entity: &str, validation: &str) {
        self.validation_failures.with_label_values(&[entity, validation]).inc();
    }

    fn host_stage_finished(&self, stage: &str, duration: Duration) {
        self.host_stage_duration
            .with_label_values(&[stage])
            .observe(duration.as_secs_f64());
    }

    fn cluster_installation_finished(&self, result: &str) {
        self.installations_finished.with_label_values(&[result]).inc();
    }
}
