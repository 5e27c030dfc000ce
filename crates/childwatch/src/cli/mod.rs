//! Command-line interface for childwatch.
//!
//! This module provides the CLI structure and command handlers for the
//! `childwatch` binary.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ListCommand, OutputFormat, PublishCommand, PurgeCommand, StatusCommand,
};
pub use output::render_alerts;

/// childwatch - Child safety alert intake
///
/// Subscribes to the alert topic of an MQTT broker, shows every alert as a
/// notification and keeps a local history that can be reviewed and
/// acknowledged.
#[derive(Debug, Parser)]
#[command(name = "childwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to the broker and ingest alerts until interrupted
    Run,

    /// List stored alerts, newest first
    List(ListCommand),

    /// Mark an alert as disclosed
    Disclose {
        /// Alert id
        id: i64,
    },

    /// Delete an alert
    Delete {
        /// Alert id
        id: i64,
    },

    /// Delete expired and/or disclosed alerts
    Purge(PurgeCommand),

    /// Publish a test alert to the broker
    Publish(PublishCommand),

    /// Show store and broker status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
