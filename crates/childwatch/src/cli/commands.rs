//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only show alerts that have not been disclosed
    #[arg(short, long)]
    pub undisclosed: bool,

    /// Maximum number of alerts to show
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Purge command arguments.
///
/// With neither flag set, both kinds of alerts are purged.
#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// Delete alerts older than the retention window
    #[arg(short, long)]
    pub expired: bool,

    /// Delete alerts that have been disclosed
    #[arg(short, long)]
    pub disclosed: bool,
}

impl PurgeCommand {
    /// Whether expired alerts should be deleted.
    #[must_use]
    pub fn purge_expired(&self) -> bool {
        self.expired || !self.disclosed
    }

    /// Whether disclosed alerts should be deleted.
    #[must_use]
    pub fn purge_disclosed(&self) -> bool {
        self.disclosed || !self.expired
    }
}

/// Publish command arguments.
#[derive(Debug, Args)]
pub struct PublishCommand {
    /// Alert text to publish
    pub message: String,

    /// Topic to publish to (defaults to the configured alert topic)
    #[arg(short, long)]
    pub topic: Option<String>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_purge_defaults_to_both() {
        let cmd = PurgeCommand {
            expired: false,
            disclosed: false,
        };
        assert!(cmd.purge_expired());
        assert!(cmd.purge_disclosed());
    }

    #[test]
    fn test_purge_single_flag() {
        let expired_only = PurgeCommand {
            expired: true,
            disclosed: false,
        };
        assert!(expired_only.purge_expired());
        assert!(!expired_only.purge_disclosed());

        let disclosed_only = PurgeCommand {
            expired: false,
            disclosed: true,
        };
        assert!(!disclosed_only.purge_expired());
        assert!(disclosed_only.purge_disclosed());
    }

    #[test]
    fn test_purge_both_flags() {
        let cmd = PurgeCommand {
            expired: true,
            disclosed: true,
        };
        assert!(cmd.purge_expired());
        assert!(cmd.purge_disclosed());
    }

    #[test]
    fn test_list_command_debug() {
        let cmd = ListCommand {
            undisclosed: true,
            limit: Some(5),
            format: OutputFormat::Table,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("undisclosed"));
        assert!(debug_str.contains("Table"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
