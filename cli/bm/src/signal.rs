//! Interrupt handling.
//!
//! Ctrl+C terminates the process straight away with the trapped-interrupt
//! exit code. In-flight requests and config writes are not unwound.

use colored::Colorize;

use crate::error::ExitCode;

/// Install the process-wide Ctrl+C handler.
pub fn install_interrupt_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        exit_interrupted();
    })
}

/// Report the interrupt and exit.
pub fn exit_interrupted() -> ! {
    eprintln!("\n{}", "Caught interrupt - exiting.".yellow());
    std::process::exit(i32::from(ExitCode::TrappedInterrupt.code()))
}
