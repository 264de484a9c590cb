//! # Core Runtime
//!
//! The logging runtime proper: the process-wide [`LogManager`], the routing
//! engine fanning emissions out to sinks, the configuration model with its
//! validation matrix, and the configuration-file watcher.
//!
//! ## Overview
//!
//! Providers emit [`core_events::TraceEvent`]s through the manager; the
//! routing engine matches each emission against the installed
//! subscriptions and hands it to every admitting sink. All configuration
//! transitions go through the manager, which keeps them atomic with
//! respect to concurrent emissions.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod manager;
pub mod routing;

mod watcher;

pub use config::{
    is_configuration_valid, BinaryLogging, LogConfig, LoggingConfig, DEFAULT_BUFFER_SIZE_MB,
    MAX_BUFFER_SIZE_MB, MAX_ROTATION_INTERVAL, MIN_BUFFER_SIZE_MB, MIN_ROTATION_INTERVAL,
};
pub use error::{Error, Result};
pub use manager::{
    manager, probe_trace_capability, resolve_default_directory, LogManager,
    DATA_DIRECTORY_VARIABLE, MIN_DEMAND_ROTATION_DELTA,
};
pub use routing::RoutingTable;
pub use watcher::DEFAULT_POLL_INTERVAL;
