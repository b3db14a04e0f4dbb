use crate::config::Settings;
use crate::content::ContentAccess;
use crate::detector;
use crate::error::{Error, FailureKind, Result};
use crate::parser::ParserSet;
use crate::source::SourceDescriptor;
use crate::state::StateMachine;
use crate::stats::AgentStats;
use crate::transport::CollectorClient;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Periodic,
    Navigation,
    Reload,
    /// Refresh command from the collector.
    Command,
    /// Operator "run now".
    Manual,
}

impl Trigger {
    /// Triggers the per-source `enabled` flag applies to.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Trigger::Command | Trigger::Manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Stopped,
    Disabled,
    OffPage,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Pushed,
    Unchanged,
    Failed(FailureKind),
    Skipped(SkipReason),
}

/// Runs extraction cycles for one source: wait, parse, decide, push.
pub struct Engine {
    source: &'static SourceDescriptor,
    content: Arc<dyn ContentAccess>,
    parsers: ParserSet,
    client: CollectorClient,
    settings: Arc<Settings>,
    state: StateMachine,
    stats: AgentStats,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    pub fn new(
        source: &'static SourceDescriptor,
        content: Arc<dyn ContentAccess>,
        parsers: ParserSet,
        client: CollectorClient,
        settings: Arc<Settings>,
    ) -> Result<Self> {
        if !parsers.supports(source.key) {
            return Err(Error::UnknownSource(source.key.to_string()));
        }
        Ok(Self {
            source,
            content,
            parsers,
            client,
            settings,
            state: StateMachine::new(),
            stats: AgentStats::new(),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn source(&self) -> &'static SourceDescriptor {
        self.source
    }

    pub fn content(&self) -> &Arc<dyn ContentAccess> {
        &self.content
    }

    pub fn client(&self) -> &CollectorClient {
        &self.client
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// One full cycle. Skipped cycles leave the agent state untouched.
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        let key = self.source.key;

        if let Some(reason) = self.gate(trigger).await {
            log::debug!("{}: {:?} cycle skipped ({:?})", key, trigger, reason);
            self.stats.increment_cycles_skipped();
            return CycleOutcome::Skipped(reason);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("{}: {:?} cycle skipped, another cycle is running", key, trigger);
            self.stats.increment_cycles_skipped();
            return CycleOutcome::Skipped(SkipReason::InFlight);
        }
        let _guard = InFlight(&self.in_flight);

        if !self.state.begin_cycle().await {
            self.stats.increment_cycles_skipped();
            return CycleOutcome::Skipped(SkipReason::Stopped);
        }
        self.stats.increment_cycles_started();
        log::debug!("{}: {:?} cycle started", key, trigger);

        let record = match self.parsers.extract(key, self.content.as_ref()).await {
            Ok(record) => record,
            Err(e) => {
                log::error!("{}: extraction failed: {}", key, e);
                self.stats.increment_parse_failures();
                self.state.parse_failed(&e).await;
                return CycleOutcome::Failed(e.kind());
            }
        };

        let previous = self.state.parsed(record.clone()).await;
        if !detector::should_push(previous.as_ref(), &record) {
            log::debug!("{}: values unchanged, not sending", key);
            self.stats.increment_pushes_unchanged();
            self.state.unchanged().await;
            return CycleOutcome::Unchanged;
        }

        let collector = self.settings.collector_url();
        let start_time = Instant::now();
        match self.client.push(&collector, &record).await {
            Ok(()) => {
                self.stats.record_push_success(start_time.elapsed());
                self.state.pushed(Utc::now()).await;
                log::info!("{}: sent {} fields to {}", key, record.fields().len(), collector);
                CycleOutcome::Pushed
            }
            Err(Error::EmptyExtraction) => {
                log::warn!("{}: page returned no data, nothing sent", key);
                self.state.push_failed(&Error::EmptyExtraction).await;
                CycleOutcome::Failed(FailureKind::EmptyExtraction)
            }
            Err(e) => {
                self.stats.record_push_failure(start_time.elapsed());
                log::warn!("{}: push to {} failed: {}", key, collector, e);
                self.state.push_failed(&e).await;
                CycleOutcome::Failed(e.kind())
            }
        }
    }

    async fn gate(&self, trigger: Trigger) -> Option<SkipReason> {
        if self.state.is_stopped().await {
            return Some(SkipReason::Stopped);
        }
        if trigger.is_automatic() && !self.settings.is_enabled(self.source.key) {
            return Some(SkipReason::Disabled);
        }
        let url = self.content.current_url().await;
        if !self.source.matches_path(&url) {
            log::info!("{}: left the expected page ({}), not extracting", self.source.key, url);
            return Some(SkipReason::OffPage);
        }
        None
    }
}
