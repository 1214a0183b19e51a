//! Config commands.

use clap::{Args, Subcommand};
use tabled::Tabled;

use crate::config::{ConfigStore, Source, CONFIG_VARS};
use crate::error::CliError;

use super::CommandContext;

/// Show, set or unset configuration variables.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommand>,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Persist a configuration variable.
    Set {
        variable: String,
        value: String,
    },

    /// Remove a persisted configuration variable.
    Unset { variable: String },
}

#[derive(Debug, Tabled)]
struct ConfigRow {
    #[tabled(rename = "Variable")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

impl ConfigCommand {
    pub fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self.command {
            None => show(ctx),
            Some(ConfigSubcommand::Set { variable, value }) => set(ctx, &variable, &value),
            Some(ConfigSubcommand::Unset { variable }) => unset(ctx, &variable),
        }
    }
}

fn show(ctx: &CommandContext) -> Result<(), CliError> {
    let rows: Vec<ConfigRow> = ctx
        .store
        .get_all()?
        .into_iter()
        .map(|var| ConfigRow {
            value: if var.name == "token" && !var.value.is_empty() {
                "<set>".to_string()
            } else {
                var.value
            },
            name: var.name,
            source: var.source.to_string(),
        })
        .collect();

    ctx.output.table(&rows);
    Ok(())
}

/// Check a value before it is persisted.
fn validate(variable: &str, value: &str) -> Result<(), CliError> {
    if !CONFIG_VARS.contains(&variable) {
        return Err(CliError::Usage(format!(
            "'{variable}' is not a configuration variable. Valid variables are: {}",
            CONFIG_VARS.join(", ")
        )));
    }

    match variable {
        "debug-level" if value.parse::<u8>().is_err() => Err(CliError::Usage(format!(
            "debug-level must be a number, not '{value}'"
        ))),
        "endpoint" | "auth-endpoint"
            if !(value.starts_with("https://") || value.starts_with("http://")) =>
        {
            Err(CliError::Usage(format!(
                "{variable} must be an http:// or https:// URL"
            )))
        }
        "yubikey" if value != "true" && value != "false" => Err(CliError::Usage(
            "yubikey must be 'true' or 'false'".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Describe a change, depending on whether the old value was persisted.
fn change_message(store: &ConfigStore, variable: &str, value: &str) -> Result<String, CliError> {
    let old = store.get_v(variable)?;
    Ok(match old.source {
        Source::File(_) => format!(
            "{variable} has been changed.\n  Old value: {}\n  New value: {value}",
            old.value
        ),
        _ => format!("{variable} has been set.\n  New value: {value}"),
    })
}

fn set(ctx: &mut CommandContext, variable: &str, value: &str) -> Result<(), CliError> {
    let variable = variable.to_ascii_lowercase();
    validate(&variable, value)?;

    let message = change_message(&ctx.store, &variable, value)?;
    ctx.store
        .set_persistent(&variable, value, Source::Interaction)?;
    ctx.output.success(&message);
    Ok(())
}

fn unset(ctx: &mut CommandContext, variable: &str) -> Result<(), CliError> {
    let variable = variable.to_ascii_lowercase();
    if !CONFIG_VARS.contains(&variable.as_str()) {
        return Err(CliError::Usage(format!(
            "'{variable}' is not a configuration variable"
        )));
    }

    ctx.store.unset(&variable)?;
    ctx.output.success(&format!("{variable} has been unset."));
    Ok(())
}
