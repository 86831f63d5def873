#![forbid(unsafe_code)]
//! Pool inspection core.
//!
//! - **probe**: `probe` classifies a pool file and extracts its parameters.
//! - **check**: `check_pool` verifies header and BTT metadata, optionally
//!   repairing checksums in place.
//! - **arena**: readers for the first BTT arena's info block and flog.
//! - **config** / **instrument**: the explicit runtime configuration and the
//!   persistence hooks that wrap every write.
//! - **file**: scoped, offset-addressed file access shared by the above.

pub mod arena;
pub mod check;
pub mod config;
pub mod file;
pub mod instrument;
pub mod probe;

pub use arena::{ArenaInfo, FlogPair, read_arena_info, read_flog};
pub use check::{CheckItem, CheckOptions, CheckReport, Verdict, check_pool};
pub use config::InspectConfig;
pub use file::PoolFile;
pub use instrument::{NoopHooks, PersistHooks, TracingHooks, hooks_for};
pub use probe::{PoolParams, PoolPayload, probe};
