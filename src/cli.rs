//! Command-line interface definition for keycloak-session
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for signing in and out, refreshing, inspecting the
//! session and issuing authenticated API requests.

use clap::{Parser, Subcommand};

/// keycloak-session - Keycloak OIDC session manager
///
/// Signs in with the authorization code flow and PKCE, keeps the tokens in
/// the OS keyring, and refreshes them as needed.
#[derive(Parser, Debug, Clone)]
#[command(name = "keycloak-session")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the realm issuer URL
    #[arg(long)]
    pub issuer: Option<String>,

    /// Override the client id
    #[arg(long)]
    pub client_id: Option<String>,

    /// Keep tokens in memory instead of the OS keyring
    #[arg(long)]
    pub memory_store: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Sign in through the browser
    Login {
        /// Print the authorization URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// End the Keycloak session and delete stored tokens
    Logout,

    /// Exchange the stored refresh token for new tokens
    Refresh,

    /// Show whether a valid session is stored
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Send an authenticated request and print the JSON response
    Request {
        /// HTTP method (GET, POST, PUT, DELETE)
        method: String,

        /// Absolute URL, or a path relative to `http.api_base_url`
        path: String,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            verbose: false,
            issuer: None,
            client_id: None,
            memory_store: false,
            command: Commands::Status { json: false },
        }
    }
}
