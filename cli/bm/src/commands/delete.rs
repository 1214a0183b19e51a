//! Delete commands.

use clap::{Args, Subcommand};
use tracing::info;

use crate::config::FlagSet;
use crate::error::CliError;
use crate::output::format_size;
use crate::resolve::{GroupName, ServerName};

use super::CommandContext;

/// Delete servers or groups.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    #[command(subcommand)]
    command: DeleteSubcommand,
}

#[derive(Debug, Subcommand)]
enum DeleteSubcommand {
    /// Delete one or more servers.
    Server(DeleteServerArgs),

    /// Delete a group.
    Group(DeleteGroupArgs),
}

#[derive(Debug, Args)]
struct DeleteServerArgs {
    /// Don't ask for confirmation.
    #[arg(long)]
    force: bool,

    /// Remove the servers permanently instead of moving them to the
    /// deleted state.
    #[arg(long)]
    purge: bool,

    /// Server names, as server[.group[.account]].
    #[arg(required = true)]
    names: Vec<String>,
}

impl FlagSet for DeleteServerArgs {
    fn config_flags(&self) -> Vec<(&'static str, String)> {
        force_flag(self.force)
    }

    fn positional(&self) -> Vec<String> {
        self.names.clone()
    }
}

#[derive(Debug, Args)]
struct DeleteGroupArgs {
    /// Don't ask for confirmation.
    #[arg(long)]
    force: bool,

    /// Also purge every server in the group.
    #[arg(long)]
    recursive: bool,

    /// Group name, as group[.account]. Defaults to the configured group.
    name: Option<String>,
}

impl FlagSet for DeleteGroupArgs {
    fn config_flags(&self) -> Vec<(&'static str, String)> {
        force_flag(self.force)
    }

    fn positional(&self) -> Vec<String> {
        self.name.iter().cloned().collect()
    }
}

fn force_flag(force: bool) -> Vec<(&'static str, String)> {
    if force {
        vec![("force", "true".to_string())]
    } else {
        Vec::new()
    }
}

impl DeleteCommand {
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self.command {
            DeleteSubcommand::Server(args) => delete_servers(ctx, args).await,
            DeleteSubcommand::Group(args) => delete_group(ctx, args).await,
        }
    }
}

async fn delete_servers(ctx: &mut CommandContext, args: DeleteServerArgs) -> Result<(), CliError> {
    let names = ctx
        .store
        .import_flags(&args)
        .iter()
        .map(|name| ServerName::resolve(name, &ctx.store))
        .collect::<Result<Vec<_>, _>>()?;

    let client = ctx.client().await?;

    for name in &names {
        let vm = client.get_virtual_machine(name).await?;
        let verb = if args.purge { "purge" } else { "delete" };
        ctx.confirm(&format!(
            "Are you sure you wish to {verb} {name} ({} cores, {})?",
            vm.cores,
            format_size(vm.memory)
        ))?;

        client.delete_virtual_machine(name, args.purge).await?;
        info!(server = %name, purge = args.purge, "Server deleted");
        ctx.output.success(&format!("{name} has been {verb}d."));
    }
    Ok(())
}

async fn delete_group(ctx: &mut CommandContext, args: DeleteGroupArgs) -> Result<(), CliError> {
    let positional = ctx.store.import_flags(&args);
    let name = GroupName::resolve(positional.first().map(String::as_str), &ctx.store)?;

    let client = ctx.client().await?;
    let group = client.get_group(&name).await?;

    if !group.virtual_machines.is_empty() {
        if !args.recursive {
            return Err(CliError::WontDeleteNonEmptyGroup {
                group: name.to_string(),
            });
        }

        for vm in &group.virtual_machines {
            ctx.output.line(format!("  {}", vm.name));
        }
        ctx.confirm(&format!(
            "The above {} servers will be purged along with {name}. Continue?",
            group.virtual_machines.len()
        ))?;

        for vm in &group.virtual_machines {
            let server = ServerName {
                server: vm.name.clone(),
                group: name.group.clone(),
                account: name.account.clone(),
            };
            client.delete_virtual_machine(&server, true).await?;
            info!(server = %server, "Server purged");
        }
    } else {
        ctx.confirm(&format!("Are you sure you wish to delete {name}?"))?;
    }

    client.delete_group(&name).await?;
    ctx.output.success(&format!("{name} has been deleted."));
    Ok(())
}
