//! Run telemetry for the Monopoly arena.
//!
//! One directory per run: append-only JSONL logs for events, decisions,
//! and applied actions; per-turn snapshot files; per-attempt prompt
//! artifacts; and a single summary written at run end. Crash recovery
//! replays from the logs alone, so artifact writes are best-effort and
//! ordered after the corresponding log append.
mod jsonl;
mod run_files;
mod summary;

pub use jsonl::*;
pub use run_files::*;
pub use summary::*;
