//! The `cmd_*` entry points of [`App`](crate::App), one per CLI subcommand.
//!
//! Each command writes human-readable output to the writer it is given and
//! returns the structured result for callers that want it.

pub mod config;
pub mod fetch;
pub mod push;
pub mod send;
pub mod show;
