use crate::error::{Error, FailureKind};
use crate::record::MetricsRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Success,
    Error,
    Stopped,
}

/// The one mutable record per agent, only ever replaced whole.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub status: AgentStatus,
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Most recently completed parse, pushed or not.
    pub last_data: Option<MetricsRecord>,
    pub last_error: String,
    pub last_failure: Option<FailureKind>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: AgentStatus::Idle,
            last_sent_at: None,
            last_data: None,
            last_error: String::new(),
            last_failure: None,
        }
    }
}

/// Cycle-boundary transitions over `AgentState`.
///
/// `Stopped` is sticky: a cycle that was already running when the agent
/// stopped still records its data and timestamps, but never moves the
/// status out of `Stopped`. Only `resume` does.
#[derive(Clone)]
pub struct StateMachine {
    state: Arc<Mutex<AgentState>>,
    state_watcher: Arc<watch::Sender<AgentState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(AgentState::default());
        Self {
            state: Arc::new(Mutex::new(AgentState::default())),
            state_watcher: Arc::new(state_tx),
        }
    }

    pub async fn snapshot(&self) -> AgentState {
        self.state.lock().await.clone()
    }

    pub fn watch(&self) -> watch::Receiver<AgentState> {
        self.state_watcher.subscribe()
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.status == AgentStatus::Stopped
    }

    /// Enters `Running`. Returns false (and changes nothing) when stopped.
    pub async fn begin_cycle(&self) -> bool {
        self.update(|state| {
            if state.status == AgentStatus::Stopped {
                return false;
            }
            state.status = AgentStatus::Running;
            true
        })
        .await
    }

    /// The parser gave up; `last_data` is left as it was.
    pub async fn parse_failed(&self, err: &Error) {
        self.update(|state| fail(state, err)).await
    }

    /// Returns the record it replaces, for change detection.
    pub async fn parsed(&self, record: MetricsRecord) -> Option<MetricsRecord> {
        self.update(|state| state.last_data.replace(record)).await
    }

    pub async fn pushed(&self, at: DateTime<Utc>) {
        self.update(|state| {
            state.last_sent_at = Some(at);
            succeed(state);
        })
        .await
    }

    /// Nothing new to send.
    pub async fn unchanged(&self) {
        self.update(succeed).await
    }

    pub async fn push_failed(&self, err: &Error) {
        self.update(|state| fail(state, err)).await
    }

    pub async fn stop(&self) {
        self.update(|state| state.status = AgentStatus::Stopped).await
    }

    /// Leaves `Stopped` for `Idle`. Returns whether the agent was stopped.
    pub async fn resume(&self) -> bool {
        self.update(|state| {
            if state.status != AgentStatus::Stopped {
                return false;
            }
            state.status = AgentStatus::Idle;
            true
        })
        .await
    }

    async fn update<T>(&self, transition: impl FnOnce(&mut AgentState) -> T) -> T {
        let mut state_guard = self.state.lock().await;
        let result = transition(&mut state_guard);
        let _ = self.state_watcher.send(state_guard.clone());
        result
    }
}

fn succeed(state: &mut AgentState) {
    state.last_error.clear();
    state.last_failure = None;
    if state.status != AgentStatus::Stopped {
        state.status = AgentStatus::Success;
    }
}

fn fail(state: &mut AgentState, err: &Error) {
    state.last_error = err.to_string();
    state.last_failure = Some(err.kind());
    if state.status != AgentStatus::Stopped {
        state.status = AgentStatus::Error;
    }
}
