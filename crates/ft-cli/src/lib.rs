//! Focus tracker CLI library.
//!
//! This crate provides the `ft` command: configuration, the GNOME focus
//! source, and the tracking control loop.

mod cli;
pub mod commands;
mod config;
pub mod desktop;
pub mod monitor;
pub mod watch;

pub use cli::{Cli, Commands, IgnoreAction};
pub use config::{Config, TimeTrackingConfig, WebhookConfig};
