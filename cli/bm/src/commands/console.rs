//! Serial console access.

use std::process::Command;

use clap::Args;
use tracing::debug;

use crate::error::CliError;
use crate::resolve::ServerName;

use super::CommandContext;

/// Open a server's serial console over SSH.
#[derive(Debug, Args)]
pub struct ConsoleCommand {
    /// Server name, as server[.group[.account]].
    server: String,
}

impl ConsoleCommand {
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        let name = ServerName::resolve(&self.server, &ctx.store)?;
        let session = ctx.authenticate().await?;
        let client = ctx.api_client(&session)?;
        let vm = client.get_virtual_machine(&name).await?;

        let target = format!("{}@console.{}", session.username, vm.hostname);
        ctx.output
            .info(&format!("Connecting to the serial console of {name}. Press Enter for a prompt."));
        run_program("ssh", &["-t", target.as_str()])
    }
}

/// Run a program attached to the terminal and wait for it to exit.
fn run_program(program: &str, args: &[&str]) -> Result<(), CliError> {
    debug!(program, ?args, "Running subprocess");

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| CliError::Subprocess {
            program: program.to_string(),
            detail: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(CliError::Subprocess {
            program: program.to_string(),
            detail: status.to_string(),
        })
    }
}
