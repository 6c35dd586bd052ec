//! Authentication commands.

use crate::context::ConsoleContext;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_engine::{AuthError, AuthState};
use secure_scoped_storage::{LegacyMigration, MigrationState, UserIdentity};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct StatusReport {
    logged_in: bool,
    state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<UserIdentity>,
    migration_done: bool,
}

/// Show the current session.
pub fn status(ctx: &ConsoleContext, format: &OutputFormat) -> Result<()> {
    let session = &ctx.session;
    let migration = LegacyMigration::new(session.credentials());

    let report = StatusReport {
        logged_in: session.is_logged_in(),
        state: session.auth_state(),
        identity: session.current_identity(),
        migration_done: migration.state() == MigrationState::Done,
    };

    match format {
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Text => {
            output::print_heading("Console session");
            output::print_row("Logged in", if report.logged_in { "yes" } else { "no" });
            output::print_row("State", &format!("{:?}", report.state));
            if let Some(identity) = &report.identity {
                output::print_row("User", &identity.username);
                if !identity.display_name.is_empty() {
                    output::print_row("Name", &identity.display_name);
                }
                if !identity.email.is_empty() {
                    output::print_row("Email", &identity.email);
                }
                output::print_row("Admin", if identity.is_admin() { "yes" } else { "no" });
            }
            output::print_row("API", &ctx.config.api_base_url);
            output::print_row(
                "Storage",
                &ctx.paths.durable_storage_file().display().to_string(),
            );
        }
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

/// Log in, prompting for anything not given on the command line.
pub async fn login(
    ctx: &ConsoleContext,
    username: Option<String>,
    password: Option<String>,
    otp: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt("Username")?,
    };
    if username.is_empty() {
        output::print_error("Username is required", format);
        return Ok(());
    }

    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    let mut otp = otp;
    loop {
        match ctx
            .session
            .login(&username, &password, otp.as_deref())
            .await
        {
            Ok(identity) => {
                let name = if identity.display_name.is_empty() {
                    identity.username.clone()
                } else {
                    identity.display_name.clone()
                };
                output::print_success(&format!("Logged in as {}", name), format);
                return Ok(());
            }
            Err(AuthError::OtpRequired) if otp.is_none() => {
                let code = prompt("One-time code")?;
                if code.is_empty() {
                    output::print_error("A one-time code is required", format);
                    return Ok(());
                }
                otp = Some(code);
            }
            Err(AuthError::InvalidCredentials(message)) => {
                output::print_error(&format!("Login failed: {}", message), format);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Log out and clear local credentials.
pub async fn logout(ctx: &ConsoleContext, format: &OutputFormat) -> Result<()> {
    if !ctx.session.is_logged_in() {
        output::print_success("Not logged in", format);
        return Ok(());
    }

    ctx.session.logout().await?;
    output::print_success("Logged out", format);
    Ok(())
}

/// Rotate the token pair now.
pub async fn refresh(ctx: &ConsoleContext, format: &OutputFormat) -> Result<()> {
    match ctx.session.refresh().await {
        Ok(()) => output::print_success("Session refreshed", format),
        Err(AuthError::NotLoggedIn) => output::print_error("Not logged in", format),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Fetch the signed-in user from the backend.
pub async fn whoami(ctx: &ConsoleContext, format: &OutputFormat) -> Result<()> {
    if !ctx.session.is_logged_in() {
        output::print_error("Not logged in", format);
        return Ok(());
    }

    let identity = ctx.session.fetch_current_user().await?;
    match format {
        OutputFormat::Json => output::print_json(&identity),
        OutputFormat::Text => {
            output::print_row("Id", &identity.id);
            output::print_row("User", &identity.username);
            output::print_row("Roles", &identity.roles.join(", "));
        }
    }
    Ok(())
}
