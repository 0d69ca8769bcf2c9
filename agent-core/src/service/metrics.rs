//! In-process counters a caller can read. Not an observability
//! pipeline: no exporter, no scrape endpoint, just three lock-free
//! counters mirroring the shape the launcher-facing orchestrator
//! naturally accumulates over its lifetime.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    vms_created: AtomicU64,
    commands_run: AtomicU64,
    run_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub vms_created: u64,
    pub commands_run: u64,
    pub run_errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_vm_created(&self) {
        self.vms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_run(&self) {
        self.commands_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_error(&self) {
        self.run_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            vms_created: self.vms_created.load(Ordering::Relaxed),
            commands_run: self.commands_run.load(Ordering::Relaxed),
            run_errors: self.run_errors.load(Ordering::Relaxed),
        }
    }
}
