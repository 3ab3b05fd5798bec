//! keycloak-session - Keycloak OIDC session manager CLI
//!
#![doc = "keycloak-session - Keycloak OIDC session manager CLI"]
#![doc = "Main entry point: loads configuration, restores the session and dispatches commands."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keycloak_session::cli::{Cli, Commands};
use keycloak_session::commands;
use keycloak_session::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .or_else(|| Config::default_path().map(|p| p.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Every command runs against a restored session
    let coordinator = commands::start_coordinator(&config).await?;

    // Execute command
    match cli.command {
        Commands::Login { no_browser } => {
            tracing::info!("Starting sign-in");
            commands::login::run_login(&coordinator, no_browser).await
        }
        Commands::Logout => {
            tracing::info!("Starting sign-out");
            commands::logout::run_logout(&coordinator).await
        }
        Commands::Refresh => {
            tracing::info!("Refreshing access token");
            commands::refresh::run_refresh(&coordinator).await
        }
        Commands::Status { json } => commands::status::run_status(&coordinator, json).await,
        Commands::Request { method, path, body } => {
            tracing::debug!("Sending {} {}", method, path);
            commands::request::run_request(&coordinator, &config, &method, &path, body.as_deref())
                .await
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "keycloak_session=debug"
    } else {
        "keycloak_session=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
