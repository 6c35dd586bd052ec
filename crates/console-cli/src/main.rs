//! Console session CLI - sign in, inspect and use an admin console session.

mod commands;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console_config_and_utils::{init_logging, Config, Paths};
use context::ConsoleContext;
use tracing::debug;

/// Console session command-line interface.
#[derive(Parser)]
#[command(name = "console-session")]
#[command(about = "Manage the admin console session from a terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the config file value
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (storage, logs, config). Defaults to ~/.eiam-console
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored session
    Status,

    /// Log in with username and password
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Prompted for when omitted
        #[arg(short, long, env = "CONSOLE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// One-time code, when the account requires one
        #[arg(long)]
        otp: Option<String>,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Rotate the token pair now
    Refresh,

    /// Fetch the signed-in user from the backend
    Whoami,

    /// Send a request through the session pipeline
    Request {
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// API path, e.g. /users
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Show or rerun the legacy storage migration
    Migrate {
        /// Ignore the completion marker and migrate again
        #[arg(long)]
        force: bool,
    },

    /// Check whether a route may be entered
    Route {
        path: String,
        /// Route requires a session
        #[arg(long)]
        auth: bool,
        /// Route requires an admin role
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    // Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level).to_string();
    init_logging(&level, Some(&paths));
    debug!(base_dir = %paths.base_dir().display(), "Starting console session CLI");

    let format = cli.format;
    let ctx = ConsoleContext::open(paths, config, format)?;

    match cli.command {
        Commands::Status => commands::status(&ctx, &format)?,
        Commands::Login {
            username,
            password,
            otp,
        } => commands::login(&ctx, username, password, otp, &format).await?,
        Commands::Logout => commands::logout(&ctx, &format).await?,
        Commands::Refresh => commands::refresh(&ctx, &format).await?,
        Commands::Whoami => commands::whoami(&ctx, &format).await?,
        Commands::Request { method, path, data } => {
            commands::request(&ctx, &method, &path, data.as_deref()).await?
        }
        Commands::Migrate { force } => commands::migrate(&ctx, force, &format)?,
        Commands::Route { path, auth, admin } => {
            commands::check_route(&ctx, &path, auth, admin, &format)?
        }
    }

    Ok(())
}
