//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive a SessionKit session against a backend from the terminal.
#[derive(Debug, Parser)]
#[command(name = "sessionkit", version, about)]
pub struct Cli {
    /// Settings file (TOML or JSON). Defaults to the per-user config file.
    #[arg(long, global = true, env = "SESSIONKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding the settings file.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Where the session is persisted. Defaults to the per-user session file.
    #[arg(long, global = true, env = "SESSIONKIT_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a token pair obtained elsewhere.
    Login {
        /// Access token.
        #[arg(long)]
        access: String,
        /// Refresh token.
        #[arg(long)]
        refresh: Option<String>,
    },
    /// Show the local session state without contacting the backend.
    Status,
    /// Exchange the refresh token for a new pair.
    Refresh,
    /// Ask the backend who the current user is.
    Me,
    /// Send an authenticated request and print the response.
    Fetch {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE).
        method: String,
        /// Path relative to the base URL, or an absolute URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
    /// End the session on the backend and locally.
    Logout,
    /// Keep the session alive with background renewal until Ctrl-C.
    Watch,
}
