use std::time::Duration;
use prometheus::{HistogramOpts, HistogramVec, Histogram, IntCounter, IntCounterVec, Opts, Registry};

use crate::domain::order::ErrorKind;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order creation and command throughput
// - Command failures by error kind
// - Command latency and per-order lock contention
//
// The registry is owned by the engine; exposing it is left to the host.
// ============================================================================

/// Central metrics registry for one engine instance
pub struct Metrics {
    registry: Registry,

    // Command Metrics
    pub orders_created: IntCounter,
    pub commands_total: IntCounterVec,
    pub command_failures: IntCounterVec,
    pub command_duration: HistogramVec,

    // Lock Metrics
    pub lock_wait: Histogram,
    pub lock_timeouts: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new(
            "orders_created_total",
            "Total orders created",
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new("order_commands_total", "Total order commands executed successfully"),
            &["command"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_failures = IntCounterVec::new(
            Opts::new("order_command_failures_total", "Total order commands rejected"),
            &["command", "kind"],
        )?;
        registry.register(Box::new(command_failures.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new("order_command_duration_seconds", "Order command duration including lock wait")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("order_lock_wait_seconds", "Time spent waiting for a per-order lock")
                .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0, 5.0]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        let lock_timeouts = IntCounter::new(
            "order_lock_timeouts_total",
            "Lock acquisitions that gave up with Busy",
        )?;
        registry.register(Box::new(lock_timeouts.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            commands_total,
            command_failures,
            command_duration,
            lock_wait,
            lock_timeouts,
        })
    }

    /// Get the Prometheus registry for exposing metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a finished command
    pub fn record_command(&self, command: &str, elapsed: Duration, failure: Option<ErrorKind>) {
        match failure {
            None => self.commands_total.with_label_values(&[command]).inc(),
            Some(kind) => self.command_failures.with_label_values(&[command, kind.as_str()]).inc(),
        }
        self.command_duration.with_label_values(&[command]).observe(elapsed.as_secs_f64());
    }

    /// Helper to record lock acquisition
    pub fn record_lock_wait(&self, waited: Duration, acquired: bool) {
        self.lock_wait.observe(waited.as_secs_f64());
        if !acquired {
            self.lock_timeouts.inc();
        }
    }
}
