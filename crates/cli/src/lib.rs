//! repofetch command-line frontend.
//!
//! Loads a workspace file, drives the repository evaluator and renders its
//! events. The binary in `main.rs` is a thin wrapper over this library.

pub mod cli;
pub mod commands;
pub mod shutdown;
pub mod tracing;
