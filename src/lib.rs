//! cliphist - clipboard history engine
//!
//! Captures clipboard changes, keeps a bounded and deduplicated history on
//! disk, and exposes it over a small local JSON API and a companion CLI.

pub mod api_server;
pub mod cli;
pub mod clipboard_history;
pub mod config;
pub mod error;
pub mod logging;
pub mod stdin_commands;
