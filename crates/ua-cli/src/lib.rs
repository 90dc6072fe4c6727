//! Usage analytics server and CLI library.
//!
//! This crate wires the engine crates together behind the `ua` binary: the
//! HTTP API, the operator commands and configuration.

pub mod api;
mod cli;
pub mod commands;
mod config;
pub mod logging;
pub mod service;

pub use cli::{Cli, Commands};
pub use config::{Config, Settings};
pub use service::{Analytics, IngestOutcome, ServiceError};
