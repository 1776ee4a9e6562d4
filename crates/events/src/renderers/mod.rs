//! Frontends that turn the event stream into terminal or machine output.

mod cli;
mod json;

pub use cli::{CliRenderer, CliRendererConfig};
pub use json::JsonRenderer;
