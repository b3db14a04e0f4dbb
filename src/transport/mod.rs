//! Collector traffic: pushing changed records and polling for refresh
//! commands.

pub mod client;
pub mod poll;

pub use client::{CollectorClient, PollResponse};
pub use poll::{CommandPoller, PollDecision};
