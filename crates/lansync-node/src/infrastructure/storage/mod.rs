//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the node's TOML file from the platform
//! directory (or an explicit path), fills in defaults for anything missing,
//! and can write the effective settings back out.

pub mod config;
