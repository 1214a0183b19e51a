//! bm - manage cloud servers from the command line.

use bm::commands;
use bm::config::Environment;
use bm::prompt::TerminalPrompter;
use bm::signal;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match commands::parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => return code.into(),
    };

    if let Err(e) = signal::install_interrupt_handler() {
        eprintln!("warning: couldn't install interrupt handler: {e}");
    }

    commands::run(cli, Environment::capture(), Box::new(TerminalPrompter))
        .await
        .into()
}
