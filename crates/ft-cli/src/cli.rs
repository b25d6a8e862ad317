//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Focused-application time tracker.
///
/// Watches which application has focus, turns that into usage sessions, and
/// submits per-application summaries to a time-tracking API, a webhook, or a
/// local store.
#[derive(Debug, Parser)]
#[command(name = "ft", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the currently focused window once.
    Window,

    /// Track focused applications until interrupted.
    Track {
        /// Submit summaries to the configured sinks.
        #[arg(long)]
        submit: bool,

        /// Show what would be submitted without sending anything.
        #[arg(long)]
        dry_run: bool,

        /// Save summaries to the sessions file on every cycle.
        #[arg(long)]
        save: bool,
    },

    /// Manage applications excluded from tracking.
    #[command(subcommand)]
    Ignore(IgnoreAction),

    /// Show summaries recorded in the local store.
    History {
        /// Maximum number of rows to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Show individual sessions instead of summaries.
        #[arg(long)]
        sessions: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Ignore-list subcommands.
#[derive(Debug, Subcommand)]
pub enum IgnoreAction {
    /// List ignored applications.
    List,

    /// Ignore an application.
    Add {
        /// Application identifier (WM class).
        application: String,
    },

    /// Stop ignoring an application.
    Remove {
        /// Application identifier (WM class).
        application: String,
    },

    /// Sample focused windows, then pick one to ignore.
    Scan {
        /// How long to sample for.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_track_flags() {
        let cli = Cli::try_parse_from(["ft", "-v", "track", "--submit", "--dry-run"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Some(Commands::Track {
                submit: true,
                dry_run: true,
                save: false
            })
        ));
    }

    #[test]
    fn parses_ignore_add() {
        let cli = Cli::try_parse_from(["ft", "ignore", "add", "steam"]).unwrap();
        match cli.command {
            Some(Commands::Ignore(IgnoreAction::Add { application })) => {
                assert_eq!(application, "steam");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn history_defaults() {
        let cli = Cli::try_parse_from(["ft", "history"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::History {
                limit: 20,
                sessions: false,
                json: false
            })
        ));

        let cli = Cli::try_parse_from(["ft", "history", "--sessions", "--limit", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::History {
                limit: 5,
                sessions: true,
                json: false
            })
        ));
    }
}
