use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cycles_started: u64,
    pub cycles_skipped: u64,
    pub parse_failures: u64,
    pub pushes_sent: u64,
    pub pushes_unchanged: u64,
    pub push_failures: u64,
    pub polls: u64,
    pub poll_failures: u64,
    pub refresh_commands: u64,
    pub document_reloads: u64,
    pub push_success_rate: f64,
    pub avg_push_time_ms: u64,
    pub uptime_seconds: f64,
}
