pub mod agent;
pub mod config;
pub mod content;
pub mod detector;
pub mod engine;
pub mod error;
pub mod parser;
pub mod record;
pub mod scheduler;
pub mod selector;
pub mod source;
pub mod state;
pub mod stats;
pub mod transport;

pub use agent::{Agent, AgentCommand, AgentOptions};
pub use engine::{CycleOutcome, Engine, SkipReason, Trigger};
pub use error::{Error, FailureKind, Result};
pub use record::{FieldValue, MetricsRecord};
pub use source::SourceDescriptor;
pub use state::{AgentState, AgentStatus};
pub use stats::{AgentStats, StatsSnapshot};
