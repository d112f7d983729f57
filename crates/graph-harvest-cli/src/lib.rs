//! Graph Harvest command-line front end.
//!
//! The binary is a thin clap layer over [`commands`]; everything that reads
//! files, resolves paths, or wires strategies together lives here so the
//! integration tests can drive it directly.

pub mod commands;
pub mod config;
