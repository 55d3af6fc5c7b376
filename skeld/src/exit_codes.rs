//! Stable exit codes for the `skeld` CLI.

/// Command succeeded; for `run`, every game reached an outcome.
pub const OK: i32 = 0;
/// Invalid config or arguments, or any other setup failure.
pub const INVALID: i32 = 1;
/// `skeld run` finished but at least one game aborted or was cancelled.
pub const ABORTED: i32 = 2;
