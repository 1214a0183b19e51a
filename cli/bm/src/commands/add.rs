//! Add commands.

use clap::{Args, Subcommand};
use tracing::info;

use crate::error::CliError;
use crate::output::format_size;
use crate::resolve::ServerName;
use crate::specs::{parse_disc_spec, DiscSpec};

use super::CommandContext;

/// Add discs to a server.
#[derive(Debug, Args)]
pub struct AddCommand {
    #[command(subcommand)]
    command: AddSubcommand,
}

#[derive(Debug, Subcommand)]
enum AddSubcommand {
    /// Add one or more discs to a server.
    ///
    /// Each disc is given as [[label:]grade:]size, e.g. `archive:50G` or
    /// `data:sata:100G`.
    Disc {
        /// Server name, as server[.group[.account]].
        server: String,

        /// Disc specifications.
        #[arg(required = true)]
        discs: Vec<String>,
    },
}

impl AddCommand {
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self.command {
            AddSubcommand::Disc { server, discs } => add_discs(ctx, &server, &discs).await,
        }
    }
}

async fn add_discs(ctx: &mut CommandContext, server: &str, discs: &[String]) -> Result<(), CliError> {
    // Bad specs fail before any login prompt.
    let specs = discs
        .iter()
        .map(|spec| parse_disc_spec(spec))
        .collect::<Result<Vec<DiscSpec>, _>>()?;
    let name = ServerName::resolve(server, &ctx.store)?;

    let client = ctx.client().await?;
    for spec in &specs {
        let disc = client.create_disc(&name, spec).await?;
        info!(server = %name, disc = %disc.label, size = disc.size, "Disc created");
        ctx.output.success(&format!(
            "Added {} disc {} ({}) to {name}.",
            disc.storage_grade,
            disc.label,
            format_size(disc.size)
        ));
    }
    Ok(())
}
