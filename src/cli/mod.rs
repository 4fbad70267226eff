//! CLI module - command-line interface
//!
//! Argument definitions and the handlers behind each subcommand.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, RunArgs};
