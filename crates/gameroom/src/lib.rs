//! Single-run coordination for the Monopoly arena.
//!
//! The [`RunManager`] mediates between the decision pipeline, the
//! telemetry writer, and an arbitrary set of subscribers. It owns the
//! only process-wide mutable state (the current run and the subscriber
//! registry), and guarantees:
//!
//! - at most one run at a time, with idempotent restarts of an
//!   identical request;
//! - cooperative pause/resume gating both engine stepping and pipeline
//!   commits;
//! - per-subscriber fan-out that never blocks the engine: each
//!   subscriber drains its own queue in its own task, and a failing
//!   subscriber is evicted without disturbing the rest.
mod broadcaster;
mod manager;
mod protocol;

pub use broadcaster::*;
pub use manager::*;
pub use protocol::*;
