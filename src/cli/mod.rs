//! CLI module for the Cloudsmith reconcile driver.
//!
//! This module provides the command-line interface that stands in for an
//! orchestrator: identities travel on the command line, not in a state file.

mod commands;
mod desired;
mod output;

pub use commands::{Cli, Commands, ListCommands, OutputFormat};
pub use desired::load_desired;
pub use output::{OutputFormatter, ResourceReport};
