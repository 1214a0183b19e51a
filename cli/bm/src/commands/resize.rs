//! Resize commands.

use clap::{Args, Subcommand};
use tracing::info;

use crate::error::CliError;
use crate::output::format_size;
use crate::resolve::ServerName;
use crate::specs::parse_size;

use super::CommandContext;

/// Resize a server's disc.
#[derive(Debug, Args)]
pub struct ResizeCommand {
    #[command(subcommand)]
    command: ResizeSubcommand,
}

#[derive(Debug, Subcommand)]
enum ResizeSubcommand {
    /// Grow a disc. Prefix the size with `+` to grow by that amount.
    Disc {
        /// Server name, as server[.group[.account]].
        server: String,

        /// Disc label.
        disc: String,

        /// New size, e.g. `50G`, or `+10G` to grow by 10 GiB.
        size: String,
    },
}

/// A requested disc size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewSize {
    Absolute(u64),
    Grow(u64),
}

impl NewSize {
    fn parse(spec: &str) -> Result<Self, CliError> {
        match spec.strip_prefix('+') {
            Some(rest) => Ok(NewSize::Grow(parse_size(rest)?)),
            None => Ok(NewSize::Absolute(parse_size(spec)?)),
        }
    }

    fn target(self, current: u64) -> u64 {
        match self {
            NewSize::Absolute(size) => size,
            NewSize::Grow(by) => current.saturating_add(by),
        }
    }
}

impl ResizeCommand {
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self.command {
            ResizeSubcommand::Disc { server, disc, size } => {
                let size = NewSize::parse(&size)?;
                let name = ServerName::resolve(&server, &ctx.store)?;
                let client = ctx.client().await?;

                let vm = client.get_virtual_machine(&name).await?;
                let current = vm
                    .discs
                    .iter()
                    .find(|d| d.label == disc)
                    .ok_or_else(|| {
                        CliError::Usage(format!("{name} has no disc labelled '{disc}'"))
                    })?;

                let target = size.target(current.size);
                if target < current.size {
                    return Err(CliError::Usage(format!(
                        "discs can't shrink: {disc} is already {}",
                        format_size(current.size)
                    )));
                }

                client.resize_disc(&name, &disc, target).await?;
                info!(server = %name, disc = %disc, from = current.size, to = target, "Disc resized");
                ctx.output.success(&format!(
                    "Resized {disc} on {name} from {} to {}.",
                    format_size(current.size),
                    format_size(target)
                ));
                Ok(())
            }
        }
    }
}
