#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsswitch - MPEG-TS failover switch
//!
//! `tsswitch` combines several redundant live MPEG transport-stream feeds into a
//! single output. Each feed is produced by an external command (for example a
//! network capture tool or an HTTP fetcher) ranked by priority; packets from
//! exactly one currently active feed are forwarded downstream. When the active
//! feed stalls, the switch promotes the next lower-priority feed after a grace
//! period; as soon as a higher-priority feed resumes emitting data, the switch
//! fails back to it immediately and tears the demoted feeds down.
//!
//! ## Quick Start
//!
//! ```text
//! tsswitch curl -s http://primary/stream.ts -- curl -s http://backup/stream.ts > out.ts
//! ```
//!
//! The first command group is rank 0 (highest priority); `--` separates groups.
//! The combined TS stream is written to stdout, logs go to stderr and are
//! filtered through `RUST_LOG`.
//!
//! ## Module Overview
//!
//! - `mux`: the failover controller and its single-threaded event loop
//! - `stream`: one ranked input (producer process + resynchronizer + deadline)
//! - `producer`: external producer process lifecycle
//! - `resync`: alignment of raw byte streams to 188-byte TS packets
//! - `output`: bounded output buffer and the downstream sink seam
//! - `config`: command-line group parsing and runtime tunables
//! - `error`: error types shared across the crate

/// Command-line group parsing and runtime tunables
pub mod config;

/// Error types and utilities
pub mod error;

/// Failover controller and event loop
pub mod mux;

/// Bounded output buffer and downstream sink seam
pub mod output;

/// External producer process lifecycle
pub mod producer;

/// TS packet resynchronizer
pub mod resync;

/// One ranked input stream
pub mod stream;

pub use error::{Result, SwitchError};
pub use mux::Mux;
