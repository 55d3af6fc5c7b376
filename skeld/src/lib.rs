//! Multi-agent social-deduction game engine.
//!
//! Players take turns on a spaceship map, alternating between a task phase
//! (move, vent, kill, do tasks) and meetings (discussion, then a vote), until
//! one side wins. Decisions come from pluggable agents: language models over
//! a chat-completions endpoint, a uniform random baseline, or a human through
//! [`bridge`].
//!
//! - **[`core`]**: Pure, deterministic game logic (map, world, legal actions,
//!   intent resolution, phase state machine). No I/O.
//! - **[`io`]**: Side effects (config files, the decision endpoint, the event
//!   log, prompt rendering).
//!
//! [`game`] runs one game; [`orchestrator`] runs many concurrently; [`setup`]
//! builds games from configuration.

pub mod agents;
pub mod bridge;
pub mod core;
pub mod exit_codes;
pub mod game;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
