//! bm - command-line client for a cloud server hosting platform.
//!
//! The binary in `main.rs` is a thin wrapper around [`commands::parse_args`]
//! and [`commands::run`]; everything else lives here so it can be tested.

pub mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod prompt;
pub mod resolve;
pub mod signal;
pub mod specs;
