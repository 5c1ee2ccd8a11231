//! netsniffer CLI
//!
//! Prints the IPv4 packets seen on one interface whose endpoints match the
//! given address filters.

mod args;
mod capture;
mod logging;
mod output;

use clap::Parser;
use nsniff_platform::{ErrorKind, PlatformError};
use std::process::ExitCode;
use tracing::error;

use args::Args;

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    if let Err(e) = logging::init(&args) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    if !args.quiet && !args.json {
        print_banner();
    }

    match capture::execute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Exit status for a failed run
///
/// 2 configuration, 3 socket, 4 runtime, 5 state, 1 anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PlatformError>() {
            return match e.kind() {
                ErrorKind::Configuration => 2,
                ErrorKind::Socket => 3,
                ErrorKind::Runtime => 4,
                ErrorKind::State => 5,
            };
        }
        if let Some(e) = cause.downcast_ref::<nsniff_core::Error>() {
            return if e.is_configuration() { 2 } else { 1 };
        }
    }
    1
}

fn print_banner() {
    use colored::Colorize;

    eprintln!();
    eprintln!(
        "{} {}",
        "netsniffer".green().bold(),
        env!("CARGO_PKG_VERSION").cyan()
    );
    eprintln!("{}", "raw socket packet sniffer".white());
    eprintln!();
}
