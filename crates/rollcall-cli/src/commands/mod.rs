//! CLI subcommand implementations.

pub mod export;
pub mod logs;
pub mod push;
pub mod replay;
pub mod status;
mod util;
