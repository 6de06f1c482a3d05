//! Command-line interface definition.

use clap::{Parser, Subcommand};

/// OAuth helper for the calwidget calendar widget.
///
/// Prints exactly one JSON payload on stdout; everything else goes to
/// stderr.
#[derive(Debug, Parser)]
#[command(name = "calwidget-helper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Print a free local port for the OAuth callback and exit
    #[arg(long)]
    pub find_port: bool,

    /// Fetch events via CalDAV REPORT
    #[arg(
        long,
        num_args = 5,
        value_names = ["SERVER_URL", "CALENDAR_ID", "ACCESS_TOKEN", "TIME_MIN", "TIME_MAX"]
    )]
    pub fetch_events: Option<Vec<String>>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Provider selection. Without a subcommand the provider is read from the
/// shared config file, defaulting to Google.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate against Google Calendar and list calendars
    Google {
        /// OAuth client id (otherwise read from credentials.json)
        client_id: Option<String>,
        /// OAuth client secret
        client_secret: Option<String>,
        /// Fixed port for the OAuth callback listener
        port: Option<u16>,
    },
    /// Authenticate against a Nextcloud instance and list calendars
    Nextcloud {
        /// Authorization endpoint URL (may carry query parameters)
        auth_endpoint: Option<String>,
        /// Token endpoint URL
        token_endpoint: Option<String>,
        /// OAuth client id (otherwise read from nextcloud_credentials.json)
        client_id: Option<String>,
        /// OAuth client secret
        client_secret: Option<String>,
        /// Fixed port for the OAuth callback listener
        port: Option<u16>,
    },
}
