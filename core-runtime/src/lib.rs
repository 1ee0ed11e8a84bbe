//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the metadata core:
//! - Logging and tracing bootstrap
//! - Configuration management (MediaServer, TrackGraph, lyrics cache)
//!
//! Every other crate in the workspace reads its settings from
//! [`config::CoreConfig`] and logs through `tracing`, with the subscriber
//! installed once by [`logging::init_logging`].

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
