//! Side-effecting helpers: configuration files, the decision endpoint, the
//! event log and prompt rendering.

pub mod config;
pub mod endpoint;
pub mod event_log;
pub mod prompt;
