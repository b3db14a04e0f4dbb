use crate::engine::{CycleOutcome, Engine, Trigger};
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const POLL_CADENCE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum PollDecision {
    /// Nothing new.
    Idle,
    /// New refresh command; the cycle it started.
    Refresh(JoinHandle<CycleOutcome>),
    /// New refresh command while stopped: sequence adopted, no cycle.
    Suppressed,
}

/// Asks the collector for refresh commands newer than the last seen
/// sequence number, forever.
pub struct CommandPoller {
    engine: Arc<Engine>,
    known_seq: AtomicU64,
    cadence: Duration,
}

impl CommandPoller {
    pub fn new(engine: Arc<Engine>, cadence: Duration) -> Self {
        Self::with_known_seq(engine, cadence, 0)
    }

    pub fn with_known_seq(engine: Arc<Engine>, cadence: Duration, known_seq: u64) -> Self {
        Self {
            engine,
            known_seq: AtomicU64::new(known_seq),
            cadence,
        }
    }

    pub fn known_seq(&self) -> u64 {
        self.known_seq.load(Ordering::SeqCst)
    }

    /// One request. Every answer's `seq` becomes the new baseline.
    pub async fn poll_once(&self) -> Result<PollDecision> {
        let stats = self.engine.stats();
        stats.increment_polls();

        let known = self.known_seq();
        let base_url = self.engine.settings().collector_url();
        let resp = self.engine.client().poll(&base_url, known).await?;
        self.known_seq.store(resp.seq, Ordering::SeqCst);

        if !resp.refresh || resp.seq == known {
            return Ok(PollDecision::Idle);
        }

        stats.increment_refresh_commands();
        if self.engine.state().is_stopped().await {
            log::debug!("Refresh command {} ignored while stopped", resp.seq);
            return Ok(PollDecision::Suppressed);
        }

        log::info!("Refresh command {} from collector, extracting now", resp.seq);
        let engine = self.engine.clone();
        let cycle = tokio::spawn(async move { engine.run_cycle(Trigger::Command).await });
        Ok(PollDecision::Refresh(cycle))
    }

    /// Polls every `cadence` until the task is aborted. Failures are
    /// counted and otherwise ignored.
    pub async fn run(self: Arc<Self>) {
        loop {
            sleep(self.cadence).await;
            if let Err(e) = self.poll_once().await {
                self.engine.stats().increment_poll_failures();
                log::debug!("Poll failed, retrying in {:?}: {}", self.cadence, e);
            }
        }
    }
}
