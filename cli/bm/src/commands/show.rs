//! Show commands.

use clap::{Args, Subcommand};
use tabled::Tabled;

use crate::client::{Account, VirtualMachine};
use crate::error::CliError;
use crate::output::{format_size, Output};
use crate::resolve::ServerName;

use super::CommandContext;

/// Show an account or a server.
#[derive(Debug, Args)]
pub struct ShowCommand {
    #[command(subcommand)]
    command: ShowSubcommand,
}

#[derive(Debug, Subcommand)]
enum ShowSubcommand {
    /// Show an account and its groups. Defaults to the configured account.
    Account {
        name: Option<String>,
    },

    /// Show a server.
    Server {
        /// Server name, as server[.group[.account]].
        name: String,
    },
}

#[derive(Debug, Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    name: String,
    #[tabled(rename = "Servers")]
    servers: usize,
}

impl ShowCommand {
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self.command {
            ShowSubcommand::Account { name } => show_account(ctx, name).await,
            ShowSubcommand::Server { name } => show_server(ctx, &name).await,
        }
    }
}

async fn show_account(ctx: &mut CommandContext, name: Option<String>) -> Result<(), CliError> {
    let name = match name {
        Some(name) => name,
        None => ctx.store.get("account")?,
    };
    let client = ctx.client().await?;
    let account = client.get_account(&name).await?;
    print_account(&ctx.output, &account);
    Ok(())
}

fn print_account(output: &Output, account: &Account) {
    output.line(format!("Account: {}", account.name));
    let rows: Vec<GroupRow> = account
        .groups
        .iter()
        .map(|group| GroupRow {
            name: group.name.clone(),
            servers: group.virtual_machines.len(),
        })
        .collect();
    output.table(&rows);
}

async fn show_server(ctx: &mut CommandContext, name: &str) -> Result<(), CliError> {
    let name = ServerName::resolve(name, &ctx.store)?;
    let client = ctx.client().await?;
    let vm = client.get_virtual_machine(&name).await?;
    print_server(&ctx.output, &name, &vm);
    Ok(())
}

fn print_server(output: &Output, name: &ServerName, vm: &VirtualMachine) {
    let power = if vm.power_on { "powered on" } else { "powered off" };
    output.line(format!("{name} ({power})"));
    output.line(format!("  Hostname: {}", vm.hostname));
    output.line(format!(
        "  {} core{}, {} memory",
        vm.cores,
        if vm.cores == 1 { "" } else { "s" },
        format_size(vm.memory)
    ));
    for disc in &vm.discs {
        output.line(format!(
            "  Disc {}: {} {}",
            disc.label,
            format_size(disc.size),
            disc.storage_grade
        ));
    }
}
