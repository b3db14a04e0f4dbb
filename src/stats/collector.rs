use crate::stats::snapshot::StatsSnapshot;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Lock-free counters shared by the engine, scheduler and poller.
#[derive(Clone)]
pub struct AgentStats {
    cycles_started: Arc<AtomicU64>,
    cycles_skipped: Arc<AtomicU64>,
    parse_failures: Arc<AtomicU64>,
    pushes_sent: Arc<AtomicU64>,
    pushes_unchanged: Arc<AtomicU64>,
    push_failures: Arc<AtomicU64>,
    polls: Arc<AtomicU64>,
    poll_failures: Arc<AtomicU64>,
    refresh_commands: Arc<AtomicU64>,
    document_reloads: Arc<AtomicU64>,
    total_push_time_ms: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self {
            cycles_started: Arc::new(AtomicU64::new(0)),
            cycles_skipped: Arc::new(AtomicU64::new(0)),
            parse_failures: Arc::new(AtomicU64::new(0)),
            pushes_sent: Arc::new(AtomicU64::new(0)),
            pushes_unchanged: Arc::new(AtomicU64::new(0)),
            push_failures: Arc::new(AtomicU64::new(0)),
            polls: Arc::new(AtomicU64::new(0)),
            poll_failures: Arc::new(AtomicU64::new(0)),
            refresh_commands: Arc::new(AtomicU64::new(0)),
            document_reloads: Arc::new(AtomicU64::new(0)),
            total_push_time_ms: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }
}

impl AgentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_cycles_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_cycles_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_pushes_unchanged(&self) {
        self.pushes_unchanged.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_polls(&self) {
        self.polls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_poll_failures(&self) {
        self.poll_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_refresh_commands(&self) {
        self.refresh_commands.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_document_reloads(&self) {
        self.document_reloads.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_push_success(&self, duration: Duration) {
        self.pushes_sent.fetch_add(1, Ordering::SeqCst);
        self.total_push_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn record_push_failure(&self, duration: Duration) {
        self.push_failures.fetch_add(1, Ordering::SeqCst);
        self.total_push_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let sent = self.pushes_sent.load(Ordering::SeqCst);
        let failed = self.push_failures.load(Ordering::SeqCst);
        let attempts = sent + failed;
        let total_time = self.total_push_time_ms.load(Ordering::SeqCst);

        let push_success_rate = if attempts > 0 {
            (sent as f64 / attempts as f64) * 100.0
        } else {
            0.0
        };

        let avg_push_time_ms = if attempts > 0 {
            total_time / attempts
        } else {
            0
        };

        StatsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::SeqCst),
            cycles_skipped: self.cycles_skipped.load(Ordering::SeqCst),
            parse_failures: self.parse_failures.load(Ordering::SeqCst),
            pushes_sent: sent,
            pushes_unchanged: self.pushes_unchanged.load(Ordering::SeqCst),
            push_failures: failed,
            polls: self.polls.load(Ordering::SeqCst),
            poll_failures: self.poll_failures.load(Ordering::SeqCst),
            refresh_commands: self.refresh_commands.load(Ordering::SeqCst),
            document_reloads: self.document_reloads.load(Ordering::SeqCst),
            push_success_rate,
            avg_push_time_ms,
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}
