//! # verifier-cli — the `verifierd` daemon
//!
//! Wires the library crates into a long-running process:
//!
//! - [`config`]: YAML daemon configuration with device defaults.
//! - [`watch`]: the config-directory poller feeding each class worker.
//! - [`daemon`]: startup ordering, crash recovery, and supervision.

pub mod config;
pub mod daemon;
pub mod watch;
