//! List commands.

use clap::{Args, Subcommand};
use tabled::Tabled;

use crate::error::CliError;
use crate::output::format_size;
use crate::resolve::GroupName;

use super::CommandContext;

/// List servers in a group.
#[derive(Debug, Args)]
pub struct ListCommand {
    #[command(subcommand)]
    command: ListSubcommand,
}

#[derive(Debug, Subcommand)]
enum ListSubcommand {
    /// List the servers in a group. Defaults to the configured group.
    Servers {
        /// Group name, as group[.account].
        group: Option<String>,
    },
}

#[derive(Debug, Tabled)]
struct ServerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Power")]
    power: &'static str,
    #[tabled(rename = "Cores")]
    cores: u32,
    #[tabled(rename = "Memory")]
    memory: String,
}

impl ListCommand {
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self.command {
            ListSubcommand::Servers { group } => {
                let group_name = GroupName::resolve(group.as_deref(), &ctx.store)?;
                let client = ctx.client().await?;
                let group = client.get_group(&group_name).await?;

                let rows: Vec<ServerRow> = group
                    .virtual_machines
                    .into_iter()
                    .map(|vm| ServerRow {
                        name: vm.name,
                        power: if vm.power_on { "on" } else { "off" },
                        cores: vm.cores,
                        memory: format_size(vm.memory),
                    })
                    .collect();
                ctx.output.table(&rows);
                Ok(())
            }
        }
    }
}
