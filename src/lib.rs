//! `scp-send`: copy local files into a directory through an SCP sink.
//!
//! The protocol lives in the `scp-source` crate; this crate adds the
//! configuration, CLI, logging and the per-session send loop.

pub mod cli;
pub mod config;
pub mod logging;
pub mod runner;

pub use cli::Cli;
pub use config::{FileSpec, PlannedFile, SendConfig, TransportKind};
pub use logging::{init_logging, LogFormat};
pub use runner::{run, send_all, SendOptions};
