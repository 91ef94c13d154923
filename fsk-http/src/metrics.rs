use std::{
    fmt::Write as _,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use serde::Serialize;

/// Kind of work a request performed, used to split the per-operation counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Encode,
    Decode,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Encode => "encode",
            Operation::Decode => "decode",
        }
    }
}

#[derive(Default)]
struct Counters {
    total_requests: u64,
    active_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    encode_requests: u64,
    decode_requests: u64,
}

/// Request counters shared by every handler. All reads and writes go through
/// one mutex so a snapshot never observes a half-applied update.
pub struct MetricsRegistry {
    started_at: Instant,
    counters: Mutex<Counters>,
}

pub type SharedMetrics = Arc<MetricsRegistry>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub encode_requests: u64,
    pub decode_requests: u64,
    pub uptime_seconds: f64,
    pub requests_per_second: f64,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a request entering the service.
    pub fn increment_total(&self) {
        let mut counters = self.counters();
        counters.total_requests += 1;
        counters.active_requests += 1;
    }

    /// Counts a request leaving the service. Must be paired with exactly one
    /// earlier `increment_total`.
    pub fn record_outcome(&self, success: bool, operation: Operation) {
        let mut counters = self.counters();
        counters.active_requests = counters.active_requests.saturating_sub(1);
        if success {
            counters.successful_requests += 1;
        } else {
            counters.failed_requests += 1;
        }
        match operation {
            Operation::Encode => counters.encode_requests += 1,
            Operation::Decode => counters.decode_requests += 1,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters();
        let uptime_seconds = self.started_at.elapsed().as_secs_f64();
        let requests_per_second = if uptime_seconds > 0.0 {
            counters.total_requests as f64 / uptime_seconds
        } else {
            0.0
        };
        MetricsSnapshot {
            total_requests: counters.total_requests,
            active_requests: counters.active_requests,
            successful_requests: counters.successful_requests,
            failed_requests: counters.failed_requests,
            encode_requests: counters.encode_requests,
            decode_requests: counters.decode_requests,
            uptime_seconds,
            requests_per_second,
        }
    }

    /// Opens an in-flight record for `operation`. Dropping the record without
    /// calling [`InFlight::finish`] counts the request as failed.
    pub fn begin(self: &Arc<Self>, operation: Operation) -> InFlight {
        self.increment_total();
        InFlight {
            metrics: Arc::clone(self),
            operation,
            finished: false,
        }
    }
}

pub struct InFlight {
    metrics: SharedMetrics,
    operation: Operation,
    finished: bool,
}

impl InFlight {
    pub fn finish(mut self, success: bool) {
        self.finished = true;
        self.metrics.record_outcome(success, self.operation);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.record_outcome(false, self.operation);
        }
    }
}

impl MetricsSnapshot {
    /// Renders the snapshot in the Prometheus text exposition format.
    pub fn render_exposition(&self) -> String {
        let series: [(&str, &str, &str, String); 8] = [
            (
                "service_requests_total",
                "Total number of requests",
                "counter",
                self.total_requests.to_string(),
            ),
            (
                "service_requests_active",
                "Current active requests",
                "gauge",
                self.active_requests.to_string(),
            ),
            (
                "service_requests_successful_total",
                "Total successful requests",
                "counter",
                self.successful_requests.to_string(),
            ),
            (
                "service_requests_failed_total",
                "Total failed requests",
                "counter",
                self.failed_requests.to_string(),
            ),
            (
                "service_encode_requests_total",
                "Total encode requests",
                "counter",
                self.encode_requests.to_string(),
            ),
            (
                "service_decode_requests_total",
                "Total decode requests",
                "counter",
                self.decode_requests.to_string(),
            ),
            (
                "service_uptime_seconds",
                "Service uptime in seconds",
                "gauge",
                self.uptime_seconds.to_string(),
            ),
            (
                "service_requests_per_second",
                "Requests per second",
                "gauge",
                self.requests_per_second.to_string(),
            ),
        ];

        let mut out = String::new();
        for (index, (name, help, kind, value)) in series.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} {kind}");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}
