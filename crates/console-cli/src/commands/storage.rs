//! Storage maintenance and route checks.

use crate::context::ConsoleContext;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_engine::{GuardDecision, RouteMeta};
use secure_scoped_storage::{LegacyMigration, MigrationOutcome};

/// Report the startup migration, or run it again with `force`.
pub fn migrate(ctx: &ConsoleContext, force: bool, format: &OutputFormat) -> Result<()> {
    let outcome = if force {
        LegacyMigration::new(ctx.session.credentials()).force_migrate()
    } else {
        ctx.migration.clone()
    };

    match outcome {
        MigrationOutcome::NotNeeded => {
            output::print_success("No legacy credentials to migrate", format)
        }
        MigrationOutcome::Migrated { tokens, identity } => output::print_success(
            &format!("Migrated legacy storage (tokens: {}, identity: {})", tokens, identity),
            format,
        ),
        MigrationOutcome::Failed(reason) => {
            output::print_error(&format!("Migration failed: {}", reason), format)
        }
    }
    Ok(())
}

/// Check whether a route may be entered with the stored session.
pub fn check_route(
    ctx: &ConsoleContext,
    path: &str,
    requires_auth: bool,
    requires_admin: bool,
    format: &OutputFormat,
) -> Result<()> {
    let route = if requires_admin {
        RouteMeta::admin(path)
    } else if requires_auth {
        RouteMeta::authenticated(path)
    } else {
        RouteMeta::public(path)
    };

    match ctx.session.guard(&route) {
        GuardDecision::Proceed => output::print_success(&format!("{}: allowed", path), format),
        GuardDecision::Redirect(target) => {
            output::print_success(&format!("{}: redirect to {}", path, target), format)
        }
    }
    Ok(())
}
