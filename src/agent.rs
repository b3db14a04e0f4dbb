use crate::config::{Configuration, Settings, SettingsUpdate};
use crate::content::ContentAccess;
use crate::engine::{CycleOutcome, Engine, Trigger};
use crate::error::{Error, Result};
use crate::parser::{Pacing, ParserSet};
use crate::scheduler::{Scheduler, NAVIGATION_DEBOUNCE, STARTUP_DELAY};
use crate::source::SourceDescriptor;
use crate::state::AgentState;
use crate::stats::StatsSnapshot;
use crate::transport::client::{POLL_TIMEOUT, PUSH_TIMEOUT};
use crate::transport::poll::POLL_CADENCE;
use crate::transport::{CollectorClient, CommandPoller};
use futures::stream::StreamExt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub pacing: Pacing,
    pub poll_cadence: Duration,
    pub push_timeout: Duration,
    pub poll_timeout: Duration,
    pub startup_delay: Duration,
    pub navigation_debounce: Duration,
    pub initial_seq: u64,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            pacing: Pacing::Reference,
            poll_cadence: POLL_CADENCE,
            push_timeout: PUSH_TIMEOUT,
            poll_timeout: POLL_TIMEOUT,
            startup_delay: STARTUP_DELAY,
            navigation_debounce: NAVIGATION_DEBOUNCE,
            initial_seq: 0,
        }
    }
}

/// Operator commands, for collaborators that drive the agent by message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    RunNow,
    Stop,
    Resume,
    ApplySettings(SettingsUpdate),
}

impl FromStr for AgentCommand {
    type Err = Error;

    /// `run`, `stop`, `resume` or `set <interval> <reload> [collector url]`.
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some("run") => AgentCommand::RunNow,
            Some("stop") => AgentCommand::Stop,
            Some("resume") => AgentCommand::Resume,
            Some("set") => {
                let mut number = |name: &str| -> Result<u64> {
                    words
                        .next()
                        .ok_or_else(|| Error::Command(format!("set: missing {}", name)))?
                        .parse()
                        .map_err(|_| Error::Command(format!("set: {} must be whole seconds", name)))
                };
                let interval_secs = number("interval")?;
                let reload_secs = number("reload")?;
                AgentCommand::ApplySettings(SettingsUpdate {
                    interval_secs,
                    reload_secs,
                    collector_url: words.next().unwrap_or_default().to_string(),
                })
            }
            _ => return Err(Error::Command(line.trim().to_string())),
        };
        Ok(command)
    }
}

struct AgentInner {
    engine: Arc<Engine>,
    scheduler: Scheduler,
    poller: Arc<CommandPoller>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One monitored page: engine, timers and command poll under one handle.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    pub fn new(
        source: &'static SourceDescriptor,
        content: Arc<dyn ContentAccess>,
        settings: Arc<Settings>,
        options: AgentOptions,
    ) -> Result<Self> {
        let client = CollectorClient::new(options.push_timeout, options.poll_timeout);
        let engine = Arc::new(Engine::new(
            source,
            content,
            ParserSet::new(options.pacing),
            client,
            settings,
        )?);
        let scheduler = Scheduler::new(
            engine.clone(),
            options.startup_delay,
            options.navigation_debounce,
        );
        let poller = Arc::new(CommandPoller::with_known_seq(
            engine.clone(),
            options.poll_cadence,
            options.initial_seq,
        ));

        Ok(Self {
            inner: Arc::new(AgentInner {
                engine,
                scheduler,
                poller,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Starts the timers and the command poll.
    pub async fn start(&self) {
        let engine = &self.inner.engine;
        let config = engine.settings().snapshot();
        log::info!(
            "Started: {} | interval {:?} | reload {:?} | collector {}",
            engine.source().label,
            config.interval(engine.source().key),
            config.reload_after(engine.source().key),
            config.collector_url
        );

        self.inner.scheduler.start().await;
        let poll_task = tokio::spawn(self.inner.poller.clone().run());
        self.inner.tasks.lock().await.push(poll_task);
    }

    /// Spawns a task applying every command sent on the returned channel.
    pub async fn commands(&self) -> mpsc::Sender<AgentCommand> {
        let (tx, rx) = mpsc::channel(16);
        let agent = self.clone();
        let task = tokio::spawn(async move {
            ReceiverStream::new(rx)
                .for_each(|command| {
                    let agent = agent.clone();
                    async move {
                        if let Err(e) = agent.handle(command).await {
                            log::error!("Command failed: {}", e);
                        }
                    }
                })
                .await;
        });
        self.inner.tasks.lock().await.push(task);
        tx
    }

    pub async fn handle(&self, command: AgentCommand) -> Result<()> {
        match command {
            AgentCommand::RunNow => {
                self.run_now().await;
            }
            AgentCommand::Stop => self.stop().await,
            AgentCommand::Resume => self.resume().await,
            AgentCommand::ApplySettings(update) => {
                self.apply_settings(update).await?;
            }
        }
        Ok(())
    }

    pub fn source(&self) -> &'static SourceDescriptor {
        self.inner.engine.source()
    }

    pub async fn state(&self) -> AgentState {
        self.inner.engine.state().snapshot().await
    }

    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.inner.engine.state().watch()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.engine.stats().snapshot()
    }

    pub fn known_seq(&self) -> u64 {
        self.inner.poller.known_seq()
    }

    /// Runs one cycle now. A stopped agent skips it; only `resume` leaves
    /// `Stopped`.
    pub async fn run_now(&self) -> CycleOutcome {
        self.inner.engine.run_cycle(Trigger::Manual).await
    }

    /// Cancels the periodic timer. A cycle already running finishes.
    pub async fn stop(&self) {
        self.inner.engine.state().stop().await;
        self.inner.scheduler.stop_periodic().await;
        self.inner.scheduler.cancel_navigation_cycle().await;
        log::info!("{}: stopped", self.source().key);
    }

    pub async fn resume(&self) {
        if self.inner.engine.state().resume().await {
            self.inner.scheduler.start_periodic().await;
            log::info!("{}: resumed", self.source().key);
        }
    }

    /// Saves new settings for this source and restarts the timers with them.
    pub async fn apply_settings(&self, update: SettingsUpdate) -> Result<Configuration> {
        let key = self.source().key;
        let applied = self.inner.engine.settings().apply(key, &update)?;
        self.inner.scheduler.start_periodic().await;
        self.inner.scheduler.arm_reload().await;
        log::info!(
            "{}: settings saved (interval {:?}, reload {:?}, collector {})",
            key,
            applied.interval(key),
            applied.reload_after(key),
            applied.collector_url
        );
        Ok(applied)
    }

    pub async fn shutdown(&self) {
        self.inner.scheduler.shutdown().await;
        for task in self.inner.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::content::HtmlDocument;
    use crate::engine::SkipReason;
    use crate::source::{self, OPENAI_BILLING};
    use crate::state::AgentStatus;

    const PAGE: &str = "https://platform.openai.com/settings/organization/billing/overview";

    fn agent() -> Agent {
        agent_with(AgentOptions {
            pacing: Pacing::Immediate,
            ..AgentOptions::default()
        })
    }

    fn agent_with(options: AgentOptions) -> Agent {
        let settings = Arc::new(Settings::load(Arc::new(MemoryStore::new())));
        Agent::new(
            source::by_key(OPENAI_BILLING).unwrap(),
            Arc::new(HtmlDocument::new(PAGE, "<section>Loading</section>")),
            settings,
            options,
        )
        .unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn parses_operator_commands() {
        assert_eq!("run".parse::<AgentCommand>().unwrap(), AgentCommand::RunNow);
        assert_eq!(" stop ".parse::<AgentCommand>().unwrap(), AgentCommand::Stop);
        assert_eq!(
            "set 90 300 http://127.0.0.1:7891".parse::<AgentCommand>().unwrap(),
            AgentCommand::ApplySettings(SettingsUpdate {
                interval_secs: 90,
                reload_secs: 300,
                collector_url: "http://127.0.0.1:7891".into(),
            })
        );
        assert!(matches!("set 90".parse::<AgentCommand>(), Err(Error::Command(_))));
        assert!(matches!("set ten 0".parse::<AgentCommand>(), Err(Error::Command(_))));
        assert!(matches!("reboot".parse::<AgentCommand>(), Err(Error::Command(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_periodic_and_resume_restarts_it() {
        let agent = agent();
        agent.start().await;
        assert!(agent.inner.scheduler.periodic_running().await);

        agent.stop().await;
        assert_eq!(agent.state().await.status, AgentStatus::Stopped);
        assert!(!agent.inner.scheduler.periodic_running().await);

        agent.resume().await;
        assert_eq!(agent.state().await.status, AgentStatus::Idle);
        assert!(agent.inner.scheduler.periodic_running().await);
        agent.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_while_stopped_keeps_timer_off() {
        let agent = agent();
        agent.stop().await;
        let applied = agent
            .apply_settings(SettingsUpdate {
                interval_secs: 45,
                reload_secs: 0,
                collector_url: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(applied.intervals[OPENAI_BILLING], 45);
        assert!(!agent.inner.scheduler.periodic_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn run_now_is_skipped_while_stopped() {
        let agent = agent();
        agent.stop().await;
        assert_eq!(agent.run_now().await, CycleOutcome::Skipped(SkipReason::Stopped));
        assert_eq!(agent.state().await.status, AgentStatus::Stopped);
        assert_eq!(agent.stats().cycles_started, 0);
        assert!(!agent.inner.scheduler.periodic_running().await);

        agent.resume().await;
        // empty page: refused locally, never reaches the network
        assert_eq!(
            agent.run_now().await,
            CycleOutcome::Failed(crate::error::FailureKind::EmptyExtraction)
        );
        assert_eq!(agent.state().await.status, AgentStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn saving_settings_restarts_the_timers_of_a_running_agent() {
        // no collector here, so keep the command poll quiet
        let agent = agent_with(AgentOptions {
            pacing: Pacing::Immediate,
            poll_cadence: Duration::from_secs(3600),
            ..AgentOptions::default()
        });
        agent.start().await;

        // startup cycle at 2.5 s
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(agent.stats().cycles_started, 1);

        agent
            .apply_settings(SettingsUpdate {
                interval_secs: 45,
                reload_secs: 120,
                collector_url: String::new(),
            })
            .await
            .unwrap();

        // the new interval counts from the save, at 55 s
        tokio::time::sleep(Duration::from_secs(44)).await;
        settle().await;
        assert_eq!(agent.stats().cycles_started, 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(agent.stats().cycles_started, 2);

        // the old 120 s interval would have fired here; the new one has not
        tokio::time::sleep(Duration::from_secs(65)).await;
        settle().await;
        assert_eq!(agent.stats().cycles_started, 3);
        assert_eq!(agent.stats().document_reloads, 0);

        // reload armed by the save fires 120 s after it, at 130 s
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(agent.stats().document_reloads, 1);

        agent.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_applied_in_order() {
        let agent = agent();
        let tx = agent.commands().await;
        let mut states = agent.watch_state();

        tx.send(AgentCommand::Stop).await.unwrap();
        states.wait_for(|s| s.status == AgentStatus::Stopped).await.unwrap();

        tx.send(AgentCommand::Resume).await.unwrap();
        states.wait_for(|s| s.status == AgentStatus::Idle).await.unwrap();
        agent.shutdown().await;
    }
}
