//! The agent's three timers plus the delayed startup cycle.
//!
//! Each timer is one task whose handle is kept so stopping, restarting or
//! re-arming it is an abort plus a fresh spawn. Cycles run in tasks of
//! their own, so aborting a timer never cuts a cycle short.

use crate::engine::{CycleOutcome, Engine, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

pub const STARTUP_DELAY: Duration = Duration::from_millis(2500);
pub const NAVIGATION_DEBOUNCE: Duration = Duration::from_millis(2500);

pub struct Scheduler {
    engine: Arc<Engine>,
    startup_delay: Duration,
    debounce: Duration,
    startup: Mutex<Option<JoinHandle<()>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    navigation: Mutex<Option<JoinHandle<()>>>,
    /// The debounce in progress after the latest on-page navigation.
    navigation_cycle: Arc<Mutex<Option<JoinHandle<()>>>>,
    reload: Mutex<Option<JoinHandle<()>>>,
}

fn spawn_cycle(engine: &Arc<Engine>, trigger: Trigger) -> JoinHandle<CycleOutcome> {
    let engine = engine.clone();
    tokio::spawn(async move { engine.run_cycle(trigger).await })
}

async fn replace(slot: &Mutex<Option<JoinHandle<()>>>, task: Option<JoinHandle<()>>) {
    let mut guard = slot.lock().await;
    if let Some(previous) = guard.take() {
        previous.abort();
    }
    *guard = task;
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, startup_delay: Duration, debounce: Duration) -> Self {
        Self {
            engine,
            startup_delay,
            debounce,
            startup: Mutex::new(None),
            periodic: Mutex::new(None),
            navigation: Mutex::new(None),
            navigation_cycle: Arc::new(Mutex::new(None)),
            reload: Mutex::new(None),
        }
    }

    /// Starts everything as a freshly loaded page does.
    pub async fn start(&self) {
        self.schedule_startup().await;
        self.start_periodic().await;
        self.watch_navigation().await;
        self.arm_reload().await;
    }

    /// One cycle shortly after start, once the page has had time to render.
    pub async fn schedule_startup(&self) {
        let engine = self.engine.clone();
        let delay = self.startup_delay;
        let task = tokio::spawn(async move {
            sleep(delay).await;
            spawn_cycle(&engine, Trigger::Startup);
        });
        replace(&self.startup, Some(task)).await;
    }

    /// (Re)starts the periodic timer from the current interval setting.
    /// Does nothing while the agent is stopped.
    pub async fn start_periodic(&self) {
        if self.engine.state().is_stopped().await {
            replace(&self.periodic, None).await;
            return;
        }

        let engine = self.engine.clone();
        let period = engine.settings().interval(engine.source().key);
        log::info!("{}: extracting every {:?}", engine.source().key, period);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                spawn_cycle(&engine, Trigger::Periodic);
            }
        });
        replace(&self.periodic, Some(task)).await;
    }

    pub async fn stop_periodic(&self) {
        replace(&self.periodic, None).await;
    }

    /// Drops a navigation cycle still waiting out its debounce.
    pub async fn cancel_navigation_cycle(&self) {
        replace(&self.navigation_cycle, None).await;
    }

    pub async fn periodic_running(&self) -> bool {
        self.periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Follows in-page navigation. Staying on the expected page schedules
    /// one cycle after the debounce, restarting it on every further
    /// navigation; leaving the page cancels it.
    pub async fn watch_navigation(&self) {
        let Some(mut urls) = self.engine.content().watch_url() else {
            return;
        };

        let engine = self.engine.clone();
        let debounce = self.debounce;
        let pending = self.navigation_cycle.clone();
        let task = tokio::spawn(async move {
            while urls.changed().await.is_ok() {
                let url = urls.borrow_and_update().clone();
                if engine.source().matches_path(&url) {
                    log::debug!("{}: navigated to {}, extracting soon", engine.source().key, url);
                    let engine = engine.clone();
                    let cycle = tokio::spawn(async move {
                        sleep(debounce).await;
                        spawn_cycle(&engine, Trigger::Navigation);
                    });
                    replace(&pending, Some(cycle)).await;
                } else {
                    log::info!("{}: navigated away to {}, extraction paused", engine.source().key, url);
                    replace(&pending, None).await;
                }
            }
        });
        replace(&self.navigation, Some(task)).await;
    }

    /// (Re)arms the whole-document reload from the current setting; 0
    /// disarms it. After each reload the page gets a startup cycle and the
    /// timer arms again, as a reloaded page would.
    pub async fn arm_reload(&self) {
        let engine = self.engine.clone();
        let key = engine.source().key;
        if engine.settings().reload_after(key).is_none() {
            replace(&self.reload, None).await;
            return;
        }

        let startup_delay = self.startup_delay;
        let task = tokio::spawn(async move {
            while let Some(after) = engine.settings().reload_after(key) {
                sleep(after).await;
                match engine.content().reload().await {
                    Ok(()) => {
                        log::info!("{}: page reloaded", key);
                        engine.stats().increment_document_reloads();
                        sleep(startup_delay).await;
                        spawn_cycle(&engine, Trigger::Reload);
                    }
                    Err(e) => log::warn!("{}: page reload failed: {}", key, e),
                }
            }
        });
        replace(&self.reload, Some(task)).await;
    }

    pub async fn shutdown(&self) {
        for slot in [&self.startup, &self.periodic, &self.navigation, &self.reload] {
            replace(slot, None).await;
        }
        self.cancel_navigation_cycle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, Settings, SettingsUpdate};
    use crate::content::HtmlDocument;
    use crate::error::FailureKind;
    use crate::parser::{Pacing, ParserSet};
    use crate::state::AgentStatus;
    use crate::source::{self, CLAUDE_USAGE};
    use crate::transport::CollectorClient;

    const PAGE: &str = "https://claude.ai/settings/usage";

    // The page carries no data, so every cycle ends at the local empty
    // check and never opens a socket under paused time.
    fn fixture(reload_secs: u64) -> (Arc<HtmlDocument>, Arc<Engine>) {
        paced_fixture(reload_secs, Pacing::Immediate)
    }

    fn paced_fixture(reload_secs: u64, pacing: Pacing) -> (Arc<HtmlDocument>, Arc<Engine>) {
        let settings = Settings::load(Arc::new(MemoryStore::new()));
        settings
            .apply(
                CLAUDE_USAGE,
                &SettingsUpdate {
                    interval_secs: 30,
                    reload_secs,
                    collector_url: String::new(),
                },
            )
            .unwrap();
        let doc = Arc::new(HtmlDocument::new(PAGE, "<main><p>Nothing yet</p></main>"));
        let engine = Engine::new(
            source::by_key(CLAUDE_USAGE).unwrap(),
            doc.clone(),
            ParserSet::new(pacing),
            CollectorClient::default(),
            Arc::new(settings),
        )
        .unwrap();
        (doc, Arc::new(engine))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_fires_on_interval() {
        let (_, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.start_periodic().await;

        sleep(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 0);

        sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 1);

        scheduler.shutdown().await;
    }

    // With full pacing the usage parser settles for 1.8 s, so half a second
    // after the tick the cycle is still running.
    #[tokio::test(start_paused = true)]
    async fn restarting_the_periodic_timer_lets_the_running_cycle_finish() {
        let (_, engine) = paced_fixture(0, Pacing::Reference);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.start_periodic().await;

        sleep(Duration::from_millis(30_500)).await;
        settle().await;
        assert_eq!(engine.state().snapshot().await.status, AgentStatus::Running);

        scheduler.start_periodic().await;
        sleep(Duration::from_secs(10)).await;
        settle().await;
        let state = engine.state().snapshot().await;
        assert_eq!(state.status, AgentStatus::Error);
        assert_eq!(state.last_failure, Some(FailureKind::EmptyExtraction));
        assert!(state.last_data.is_some());

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_mid_cycle_still_records_the_result() {
        let (_, engine) = paced_fixture(0, Pacing::Reference);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.start_periodic().await;

        sleep(Duration::from_millis(30_500)).await;
        settle().await;
        engine.state().stop().await;
        scheduler.stop_periodic().await;

        sleep(Duration::from_secs(10)).await;
        settle().await;
        let state = engine.state().snapshot().await;
        assert_eq!(state.status, AgentStatus::Stopped);
        assert_eq!(state.last_failure, Some(FailureKind::EmptyExtraction));
        assert!(state.last_data.is_some());
        assert_eq!(engine.stats().snapshot().cycles_started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_does_not_start_while_stopped() {
        let (_, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        engine.state().stop().await;
        scheduler.start_periodic().await;
        assert!(!scheduler.periodic_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_on_page_schedules_one_debounced_cycle() {
        let (doc, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.watch_navigation().await;
        settle().await;

        doc.navigate("https://claude.ai/settings/usage?tab=weekly", "<p>Nothing</p>").await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 0);

        sleep(NAVIGATION_DEBOUNCE + Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn each_navigation_restarts_the_debounce() {
        let (doc, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.watch_navigation().await;
        settle().await;

        doc.navigate("https://claude.ai/settings/usage?tab=session", "<p>Nothing</p>").await;
        settle().await;
        sleep(Duration::from_secs(1)).await;
        doc.navigate("https://claude.ai/settings/usage?tab=weekly", "<p>Nothing</p>").await;
        settle().await;

        // the first debounce would have ended at 2.5 s
        sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 0);

        sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 1);

        sleep(NAVIGATION_DEBOUNCE * 2).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().cycles_started, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_a_pending_navigation_cycle() {
        let (doc, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.watch_navigation().await;
        settle().await;

        doc.navigate("https://claude.ai/settings/usage?tab=weekly", "<p>Nothing</p>").await;
        settle().await;
        scheduler.shutdown().await;

        sleep(NAVIGATION_DEBOUNCE * 2).await;
        settle().await;
        let stats = engine.stats().snapshot();
        assert_eq!(stats.cycles_started, 0);
        assert_eq!(stats.cycles_skipped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_off_page_never_extracts() {
        let (doc, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.watch_navigation().await;
        settle().await;

        doc.navigate("https://claude.ai/new", "<p>Chat</p>").await;
        sleep(NAVIGATION_DEBOUNCE * 2).await;
        settle().await;
        let stats = engine.stats().snapshot();
        assert_eq!(stats.cycles_started, 0);
        assert_eq!(stats.cycles_skipped, 0);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reload_timer_reloads_then_rearms() {
        let (_, engine) = fixture(20);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.arm_reload().await;

        sleep(Duration::from_secs(21)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().document_reloads, 1);

        // 20 s reload + 2.5 s startup delay + 20 s
        sleep(Duration::from_secs(23)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().document_reloads, 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_reload_seconds_disarms() {
        let (_, engine) = fixture(0);
        let scheduler = Scheduler::new(engine.clone(), STARTUP_DELAY, NAVIGATION_DEBOUNCE);
        scheduler.arm_reload().await;
        sleep(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(engine.stats().snapshot().document_reloads, 0);
    }
}
