//! Deterministic game logic.
//!
//! Core modules are free of I/O and async. They operate on in-memory world and
//! state values owned by a single game and return deterministic results.

pub mod action;
pub mod catalog;
pub mod map;
pub mod resolver;
pub mod rules;
pub mod state;
pub mod tally;
pub mod types;
pub mod view;
pub mod world;
