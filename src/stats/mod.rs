pub mod collector;
pub mod snapshot;

pub use collector::AgentStats;
pub use snapshot::StatsSnapshot;
