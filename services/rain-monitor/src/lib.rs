//! Rain monitor library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod config;
pub mod monitor;
pub mod notify;

pub use config::MonitorConfig;
pub use monitor::{CycleReport, Monitor};
pub use notify::{LogNotifier, Notifier};
