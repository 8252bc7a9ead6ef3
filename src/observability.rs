use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

use crate::artifact::CaseStatus;

#[cfg(feature = "metrics-server")]
pub mod server;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub phases: BTreeMap<String, PhaseMetrics>,
    pub total_duration_ms: f64,
    pub cases_ok: u64,
    pub cases_error: u64,
    pub cases_timeout: u64,
    pub regressions: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct PhaseMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn global() -> &'static MetricsCollector {
        static INSTANCE: Lazy<MetricsCollector> = Lazy::new(|| MetricsCollector {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        });
        &INSTANCE
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn start_phase(&self, phase_name: &str) -> PhaseTimer {
        PhaseTimer {
            phase: phase_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_case_outcome(&self, status: CaseStatus) {
        if let Ok(mut guard) = self.inner.lock() {
            match status {
                CaseStatus::Ok => guard.cases_ok += 1,
                CaseStatus::Error => guard.cases_error += 1,
                CaseStatus::Timeout => guard.cases_timeout += 1,
            }
        }
    }

    pub fn record_regressions(&self, count: u64) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.regressions += count;
        }
    }

    pub fn record_publish_failure(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.publish_failures += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

pub struct PhaseTimer {
    phase: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl PhaseTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration = self.started_at.elapsed();
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.phases.entry(self.phase.clone()).or_default();
            metrics.calls += 1;
            let duration_ms = duration.as_secs_f64() * 1_000.0;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(
            phase = self.phase.as_str(),
            duration_ms = duration.as_secs_f64() * 1_000.0,
            "Phase duration recorded"
        );
        self.recorded = true;
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        phase_count = snapshot.phases.len(),
        cases_ok = snapshot.cases_ok,
        cases_error = snapshot.cases_error,
        cases_timeout = snapshot.cases_timeout,
        regressions = snapshot.regressions,
        "Pipeline metrics summary"
    );
    for (phase, metrics) in &snapshot.phases {
        info!(
            phase = phase.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Phase metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str("# HELP benchgate_cases_total Benchmark case outcomes by status\n");
        output.push_str("# TYPE benchgate_cases_total counter\n");
        output.push_str(&format!(
            "benchgate_cases_total{{status=\"ok\"}} {}\n",
            self.cases_ok
        ));
        output.push_str(&format!(
            "benchgate_cases_total{{status=\"error\"}} {}\n",
            self.cases_error
        ));
        output.push_str(&format!(
            "benchgate_cases_total{{status=\"timeout\"}} {}\n",
            self.cases_timeout
        ));
        output.push_str("# HELP benchgate_regressions_total Cases flagged as regressed\n");
        output.push_str("# TYPE benchgate_regressions_total counter\n");
        output.push_str(&format!(
            "benchgate_regressions_total {}\n",
            self.regressions
        ));
        output.push_str("# HELP benchgate_publish_failures_total Failed artifact publishes\n");
        output.push_str("# TYPE benchgate_publish_failures_total counter\n");
        output.push_str(&format!(
            "benchgate_publish_failures_total {}\n",
            self.publish_failures
        ));
        output.push_str("# HELP benchgate_phase_calls_total Phase invocation count\n");
        output.push_str("# TYPE benchgate_phase_calls_total counter\n");
        output.push_str(
            "# HELP benchgate_phase_duration_seconds_total Accumulated phase duration in seconds\n",
        );
        output.push_str("# TYPE benchgate_phase_duration_seconds_total counter\n");
        output.push_str(
            "# HELP benchgate_phase_duration_seconds_max Maximum phase duration in seconds\n",
        );
        output.push_str("# TYPE benchgate_phase_duration_seconds_max gauge\n");
        for (phase, metrics) in &self.phases {
            output.push_str(&format!(
                "benchgate_phase_calls_total{{phase=\"{}\"}} {}\n",
                phase, metrics.calls
            ));
            output.push_str(&format!(
                "benchgate_phase_duration_seconds_total{{phase=\"{}\"}} {:.6}\n",
                phase,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "benchgate_phase_duration_seconds_max{{phase=\"{}\"}} {:.6}\n",
                phase,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output.push_str("# HELP benchgate_pipeline_duration_seconds Total pipeline duration\n");
        output.push_str("# TYPE benchgate_pipeline_duration_seconds gauge\n");
        output.push_str(&format!(
            "benchgate_pipeline_duration_seconds {:.6}\n",
            self.total_duration_ms / 1_000.0
        ));
        output
    }
}
