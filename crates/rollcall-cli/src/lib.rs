//! Rollcall CLI library.
//!
//! This crate provides the `rc` command-line interface over the rollcall
//! session log stores.

mod cli;
pub mod commands;
mod config;
pub mod store;

pub use cli::{Cli, Commands, LogsAction};
pub use config::{Config, LogStoreKind};
