//! nsrun core - platform-independent run supervision
//!
//! This crate provides the version gate, the process traits and run handle,
//! the output relay, the lifecycle supervisor and the command surface that
//! are shared across the platform-specific process managers.

mod cli;
mod commands;
mod config;
mod error;
mod extension;
mod invocation;
mod pane;
mod process;
mod services;
mod stdio;
mod subscriptions;
mod supervisor;
mod target;
mod version;

#[cfg(test)]
mod testing;

pub use cli::*;
pub use commands::*;
pub use config::*;
pub use error::*;
pub use extension::*;
pub use invocation::*;
pub use pane::*;
pub use process::*;
pub use services::*;
pub use stdio::*;
pub use subscriptions::*;
pub use supervisor::*;
pub use target::*;
pub use version::*;
